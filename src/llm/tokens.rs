use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, cl100k_base};

static BPE: OnceLock<CoreBPE> = OnceLock::new();

#[derive(Debug)]
pub struct TokenService;

impl TokenService {
    /// Estimate tokens for a string using `cl100k_base` (GPT-4/3.5 standard).
    pub fn estimate_string(content: &str) -> anyhow::Result<usize> {
        let bpe = match BPE.get() {
            Some(bpe) => bpe,
            None => {
                let bpe = cl100k_base()?;
                BPE.get_or_init(|| bpe)
            }
        };
        Ok(bpe.encode_with_special_tokens(content).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_is_positive_for_text() {
        let n = TokenService::estimate_string("What is 90 divided by 0.5?").unwrap();
        assert!(n > 0);
        assert_eq!(TokenService::estimate_string("").unwrap(), 0);
    }
}
