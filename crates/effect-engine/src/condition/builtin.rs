//! 内置条件

use super::{Condition, NoCompileData};
use crate::compiler::CompileContext;
use crate::config::{ConfigSection, EvaluationContext};
use crate::error::Result;
use crate::holder::ProvidedHolder;
use crate::subject::Subject;

/// 占位符解析后的文本与期望值相等
pub struct PlaceholderEquals;

impl Condition for PlaceholderEquals {
    type CompileData = NoCompileData;

    fn id(&self) -> &str {
        "placeholder_equals"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<()> {
        config.require_string("placeholder")?;
        config.require_string("value")?;
        Ok(())
    }

    fn is_met(
        &self,
        _subject: &dyn Subject,
        ctx: &EvaluationContext<'_>,
        _holder: Option<&ProvidedHolder>,
        _: &(),
    ) -> Result<bool> {
        Ok(ctx.get_string("placeholder")? == ctx.get_string("value")?)
    }
}

/// 数值比较的公共校验
fn require_numeric_pair(config: &ConfigSection) -> Result<()> {
    config.require_string("placeholder")?;
    config.require_string("value")?;
    Ok(())
}

/// 占位符数值大于期望值
pub struct PlaceholderGreaterThan;

impl Condition for PlaceholderGreaterThan {
    type CompileData = NoCompileData;

    fn id(&self) -> &str {
        "placeholder_greater_than"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<()> {
        require_numeric_pair(config)
    }

    fn is_met(
        &self,
        _subject: &dyn Subject,
        ctx: &EvaluationContext<'_>,
        _holder: Option<&ProvidedHolder>,
        _: &(),
    ) -> Result<bool> {
        Ok(ctx.get_double("placeholder")? > ctx.get_double("value")?)
    }
}

/// 占位符数值小于期望值
pub struct PlaceholderLessThan;

impl Condition for PlaceholderLessThan {
    type CompileData = NoCompileData;

    fn id(&self) -> &str {
        "placeholder_less_than"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<()> {
        require_numeric_pair(config)
    }

    fn is_met(
        &self,
        _subject: &dyn Subject,
        ctx: &EvaluationContext<'_>,
        _holder: Option<&ProvidedHolder>,
        _: &(),
    ) -> Result<bool> {
        Ok(ctx.get_double("placeholder")? < ctx.get_double("value")?)
    }
}

/// 主体拥有指定权限
pub struct HasPermission;

impl Condition for HasPermission {
    /// 权限名在编译期固定
    type CompileData = String;

    fn id(&self) -> &str {
        "has_permission"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<String> {
        config.require_string("permission")
    }

    fn is_met(
        &self,
        subject: &dyn Subject,
        _ctx: &EvaluationContext<'_>,
        _holder: Option<&ProvidedHolder>,
        permission: &String,
    ) -> Result<bool> {
        Ok(subject.has_permission(permission))
    }
}

/// 主体的数值属性不低于期望值；属性缺失或非数值时不满足
pub struct AttributeAtLeast;

impl Condition for AttributeAtLeast {
    type CompileData = String;

    fn id(&self) -> &str {
        "attribute_at_least"
    }

    fn make_compile_data(&self, config: &ConfigSection, _: &CompileContext<'_>) -> Result<String> {
        config.require_string("value")?;
        config.require_string("attribute")
    }

    fn is_met(
        &self,
        subject: &dyn Subject,
        ctx: &EvaluationContext<'_>,
        _holder: Option<&ProvidedHolder>,
        attribute: &String,
    ) -> Result<bool> {
        let Some(current) = subject.attribute(attribute).and_then(|v| v.as_f64()) else {
            return Ok(false);
        };
        Ok(current >= ctx.get_double("value")?)
    }
}
