//! 定义文件
//!
//! 宿主二进制使用的 JSON 定义：具名链、持有者和演示用主体。
//! 链先于持有者编译，持有者中的 `run_chain` 才能按 ID 引用链。

use crate::chain::Chain;
use crate::engine::Engine;
use crate::error::Result;
use crate::holder::{Holder, HolderProvider, ProvidedHolder};
use crate::subject::{SimpleSubject, Subject};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 主体定义
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectDefinition {
    pub name: String,
    #[serde(default)]
    pub holders: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl SubjectDefinition {
    /// 由名称导出的稳定主体 ID
    pub fn subject_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.name.as_bytes())
    }

    pub fn instantiate(&self) -> SimpleSubject {
        let subject = SimpleSubject::with_id(self.subject_id(), &self.name);
        for (key, value) in &self.attributes {
            subject.set_attribute(key.clone(), value.clone());
        }
        for permission in &self.permissions {
            subject.add_base_permission(permission.clone());
        }
        subject
    }
}

/// 定义文件内容
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub chains: Vec<Value>,
    #[serde(default)]
    pub holders: Vec<Value>,
    #[serde(default)]
    pub subjects: Vec<SubjectDefinition>,
}

impl Definitions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// 编译全部链和持有者，无效的条目被跳过
    pub fn compile(&self, engine: &Engine, source: &str) -> CompiledDefinitions {
        let chains: Vec<Arc<Chain>> = self
            .chains
            .iter()
            .enumerate()
            .filter_map(|(i, config)| {
                engine.compile_chain(
                    &engine.section(config.clone()),
                    &format!("{} chains[{}]", source, i),
                    false,
                )
            })
            .collect();

        let holders: BTreeMap<String, Arc<Holder>> = self
            .holders
            .iter()
            .enumerate()
            .filter_map(|(i, config)| {
                engine.compile_holder(
                    &engine.section(config.clone()),
                    &format!("{} holders[{}]", source, i),
                )
            })
            .map(|holder| (holder.id().to_string(), holder))
            .collect();

        info!(
            source = %source,
            chains = chains.len(),
            holders = holders.len(),
            "定义编译完成"
        );

        CompiledDefinitions { chains, holders }
    }
}

/// 编译后的定义
#[derive(Debug, Default)]
pub struct CompiledDefinitions {
    pub chains: Vec<Arc<Chain>>,
    pub holders: BTreeMap<String, Arc<Holder>>,
}

impl CompiledDefinitions {
    /// 按定义创建主体，并生成把持有者分配给这些主体的静态提供者
    pub fn instantiate_subjects(
        &self,
        subjects: &[SubjectDefinition],
    ) -> (Vec<Arc<SimpleSubject>>, StaticHolderProvider) {
        let mut provider = StaticHolderProvider::default();
        let mut instances = Vec::with_capacity(subjects.len());

        for definition in subjects {
            let subject = Arc::new(definition.instantiate());
            for holder_id in &definition.holders {
                match self.holders.get(holder_id) {
                    Some(holder) => provider.assign(
                        subject.id(),
                        ProvidedHolder::new(holder.clone()).with_placeholder("holder", holder_id),
                    ),
                    None => warn!(subject = %definition.name, holder = %holder_id, "未知的持有者"),
                }
            }
            instances.push(subject);
        }

        (instances, provider)
    }
}

/// 按主体 ID 固定分配持有者的提供者
#[derive(Debug, Default)]
pub struct StaticHolderProvider {
    assignments: HashMap<Uuid, Vec<ProvidedHolder>>,
}

impl StaticHolderProvider {
    pub fn assign(&mut self, subject_id: Uuid, holder: ProvidedHolder) {
        self.assignments.entry(subject_id).or_default().push(holder);
    }
}

impl HolderProvider for StaticHolderProvider {
    fn provide(&self, subject: &dyn Subject) -> Vec<ProvidedHolder> {
        self.assignments
            .get(&subject.id())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITIONS: &str = r#"{
        "chains": [
            { "id": "greet", "effects": [ { "id": "send_message", "args": { "message": "hello %subject_name%" } } ] },
            { "id": "empty", "effects": [] }
        ],
        "holders": [
            {
                "id": "badge",
                "effects": [
                    { "id": "run_chain", "args": { "chain": "greet" }, "triggers": ["tick"] },
                    { "id": "give_permission", "args": { "permission": "fly" } }
                ]
            },
            { "effects": [] }
        ],
        "subjects": [
            { "name": "steve", "holders": ["badge", "missing"], "attributes": { "level": 3 } },
            { "name": "alex", "permissions": ["chat"] }
        ]
    }"#;

    #[test]
    fn test_compile_skips_invalid_entries() {
        let definitions = Definitions::from_json(DEFINITIONS).unwrap();
        let engine = Engine::default();
        let compiled = definitions.compile(&engine, "definitions.json");

        assert_eq!(compiled.chains.len(), 1);
        assert_eq!(compiled.holders.keys().collect::<Vec<_>>(), vec!["badge"]);
        assert!(engine.chain("greet").is_some());
        assert!(engine.chain("empty").is_none());
    }

    #[test]
    fn test_instantiate_subjects() {
        let definitions = Definitions::from_json(DEFINITIONS).unwrap();
        let engine = Engine::default();
        let compiled = definitions.compile(&engine, "definitions.json");
        let (subjects, provider) = compiled.instantiate_subjects(&definitions.subjects);

        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].id(), definitions.subjects[0].subject_id());
        assert_eq!(subjects[0].attribute("level"), Some(serde_json::json!(3)));
        assert!(subjects[1].has_permission("chat"));

        let provided = provider.provide(subjects[0].as_ref());
        assert_eq!(provided.len(), 1);
        assert_eq!(provided[0].placeholders().get("holder"), Some("badge"));
        assert!(provider.provide(subjects[1].as_ref()).is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(Definitions::from_json("{ not json").is_err());
        assert!(Definitions::load("/nonexistent/definitions.json").is_err());
    }
}
