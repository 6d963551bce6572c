use anyhow::{Result, anyhow};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// BERT `[PAD]` token id.
pub const PAD_ID: u32 = 0;

/// Encodes `text` with special tokens into `(input_ids, attention_mask)`, both
/// `[1, max_len]`.
///
/// Over-long inputs are cut down to `max_len`, keeping the trailing special
/// token (`[SEP]` for BERT). Short inputs are right-padded with `PAD_ID` and a zero mask.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let encoding = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let ids = fit_to_window(encoding.get_ids(), encoding.get_special_tokens_mask(), max_len, PAD_ID);
    let real = encoding.get_ids().len().min(max_len);
    let mask: Vec<u32> = (0..max_len).map(|i| u32::from(i < real)).collect();
    let input_ids = Tensor::from_vec(ids, (1, max_len), device)?;
    let attention_mask = Tensor::from_vec(mask, (1, max_len), device)?;
    Ok((input_ids, attention_mask))
}

fn fit_to_window(ids: &[u32], special: &[u32], max_len: usize, pad: u32) -> Vec<u32> {
    let mut out: Vec<u32> = ids.iter().copied().take(max_len).collect();
    let ends_with_special = special.last() == Some(&1);
    if ids.len() > max_len && ends_with_special && max_len >= 2 {
        if let (Some(slot), Some(&closing)) = (out.last_mut(), ids.last()) { *slot = closing; }
    }
    out.resize(max_len, pad);
    out
}
