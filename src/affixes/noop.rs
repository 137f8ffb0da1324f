//! Pass-through affix.

use crate::affix::{Affix, AffixError, AffixResult};

/// Forwards every operation unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAffix;

impl NoopAffix {
    pub const NAME: &'static str = "NoopAffix";

    pub fn build(args: Option<&str>) -> AffixResult<Box<dyn Affix>> {
        if let Some(args) = args {
            return Err(AffixError::InvalidArguments {
                affix: Self::NAME.to_string(),
                reason: format!("takes no arguments, got '{args}'"),
            });
        }
        Ok(Box::new(NoopAffix))
    }
}

impl Affix for NoopAffix {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn copy(&self) -> Box<dyn Affix> {
        Box::new(*self)
    }

    fn advertisement(&self) -> String {
        self.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_arguments() {
        assert!(NoopAffix::build(None).is_ok());
        assert!(matches!(
            NoopAffix::build(Some("x")),
            Err(AffixError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn advertises_itself() {
        assert_eq!(NoopAffix.advertisement(), "(NoopAffix)");
    }
}
