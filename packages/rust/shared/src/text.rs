//! Text helpers: accent folding, normalization, identifiers and hashing.

use sha2::{Digest, Sha256};

use crate::error::{LeizillaError, Result};

/// Map a Portuguese/Latin-1 accented character to its ASCII base letter.
fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        'º' | '°' => 'o',
        'ª' => 'a',
        other => other,
    }
}

/// Strip diacritics, keeping case.
pub fn fold_accents(input: &str) -> String {
    input.chars().map(fold_char).collect()
}

/// Lowercase, accent-fold and collapse whitespace.
///
/// Used both for the stored `normalized_text` column and for search needles,
/// so a query for "publicacao" matches "PUBLICAÇÃO".
pub fn normalize_text(input: &str) -> String {
    let folded = fold_accents(input).to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase slug: every run of non-alphanumeric characters becomes one `-`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in fold_accents(input).chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Build a law identifier: `{origin}-{type}-{year}-{number}`.
///
/// Dots and slashes inside the number are dropped (`5.775` → `5775`).
pub fn law_id(origin: &str, law_type: Option<&str>, year: i32, number: &str) -> Result<String> {
    let origin = slugify(origin);
    let law_type = slugify(law_type.unwrap_or("lei"));
    let compact: String = number.chars().filter(|c| !matches!(c, '.' | '/')).collect();
    let number = slugify(&compact);

    if origin.is_empty() {
        return Err(LeizillaError::validation("law id requires an origin"));
    }
    if number.is_empty() {
        return Err(LeizillaError::validation(format!(
            "law number '{compact}' has no alphanumeric characters"
        )));
    }

    let law_type = if law_type.is_empty() { "lei".to_string() } else { law_type };
    Ok(format!("{origin}-{law_type}-{year}-{number}"))
}

/// SHA-256 of raw bytes, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
