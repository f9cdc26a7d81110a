use std::fmt;

/// Text shown, saved and spoken when inference fails.
pub const CAPTION_FAILURE_SENTINEL: &str = "Caption processing error";

/// Always renders to a string; downstream stages never see an absent caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caption {
    Generated(String),
    Failed,
}

impl Caption {
    pub fn generated(text: impl Into<String>) -> Self {
        Caption::Generated(text.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Caption::Generated(text) => text,
            Caption::Failed => CAPTION_FAILURE_SENTINEL,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Caption::Failed)
    }
}

impl fmt::Display for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_caption_reads_as_sentinel() {
        assert_eq!(Caption::Failed.as_str(), CAPTION_FAILURE_SENTINEL);
        assert_eq!(Caption::Failed.to_string(), CAPTION_FAILURE_SENTINEL);
        assert_eq!(Caption::generated("a dog on a sofa").as_str(), "a dog on a sofa");
        assert!(Caption::Failed.is_failed());
        assert!(!Caption::generated("a dog on a sofa").is_failed());
    }
}
