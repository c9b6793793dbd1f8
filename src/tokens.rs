//! BPE token counting for the chunker.

use anyhow::{anyhow, Result};
use tiktoken_rs::CoreBPE;

use docgpt_core::chunk::TokenCounter;

/// Counts tokens with the GPT-2 (`r50k_base`) byte-pair encoding.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::r50k_base()
            .map_err(|e| anyhow!("Failed to load r50k_base encoding: {}", e))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_bpe_tokens() {
        let counter = TiktokenCounter::new().unwrap();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("hello"), 1);
        assert!(counter.count("The quick brown fox jumps over the lazy dog.") >= 9);
    }
}
