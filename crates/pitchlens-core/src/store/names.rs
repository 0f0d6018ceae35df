// Name normalization and cross-source name resolution.
//
// Player, team and shot rows come from different providers, so names are
// joined on a normalized form rather than on raw text.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Lower-case, trim, strip diacritics and punctuation, collapse whitespace.
///
/// `"  Kylian  Mbappé-Lottin "` becomes `"kylian mbappelottin"`.
pub fn normalize_name(input: &str) -> String {
    let mut folded = String::with_capacity(input.len());
    for ch in input.chars() {
        match fold_char(ch) {
            Some(base) => folded.push_str(base),
            None => folded.push(ch),
        }
    }

    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;
    for ch in folded.chars() {
        if ch.is_whitespace() || ch == '_' {
            pending_space = !out.is_empty();
        } else if ch.is_alphanumeric() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Slug form used inside identifiers: normalized words joined by `_`.
pub fn slug(input: &str) -> String {
    normalize_name(input).replace(' ', "_")
}

/// ASCII base form of a Latin letter with a diacritic. Combining marks fold
/// to nothing. `None` means the character passes through unchanged.
fn fold_char(ch: char) -> Option<&'static str> {
    let base = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "a",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' | 'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => "c",
        'ď' | 'đ' | 'Ď' | 'Đ' | 'ð' | 'Ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' | 'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => "g",
        'ĥ' | 'ħ' | 'Ĥ' | 'Ħ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => "i",
        'ĵ' | 'Ĵ' => "j",
        'ķ' | 'Ķ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' | 'Ĺ' | 'Ļ' | 'Ľ' | 'Ŀ' | 'Ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' | 'Ñ' | 'Ń' | 'Ņ' | 'Ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' => "o",
        'ŕ' | 'ŗ' | 'ř' | 'Ŕ' | 'Ŗ' | 'Ř' => "r",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ș' | 'Ś' | 'Ŝ' | 'Ş' | 'Š' | 'Ș' => "s",
        'ţ' | 'ť' | 'ŧ' | 'ț' | 'Ţ' | 'Ť' | 'Ŧ' | 'Ț' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => "u",
        'ŵ' | 'Ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' | 'Ý' | 'Ÿ' | 'Ŷ' => "y",
        'ź' | 'ż' | 'ž' | 'Ź' | 'Ż' | 'Ž' => "z",
        'ß' => "ss",
        'æ' | 'Æ' => "ae",
        'œ' | 'Œ' => "oe",
        'þ' | 'Þ' => "th",
        '\u{0300}'..='\u{036f}' => "",
        _ => return None,
    };
    Some(base)
}

// ---------------------------------------------------------------------------
// Name index
// ---------------------------------------------------------------------------

/// Normalized-name lookup table. Keys are kept in a sorted list as well so
/// fallback scans visit candidates in a deterministic order.
#[derive(Debug, Clone)]
pub struct NameIndex<I> {
    exact: HashMap<String, usize>,
    sorted: Vec<(String, I)>,
}

impl<I> Default for NameIndex<I> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            sorted: Vec::new(),
        }
    }
}

impl<I> NameIndex<I> {
    /// Build from (normalized key, id) pairs. The first id seen for a key
    /// wins; blank keys are ignored.
    pub fn build(entries: impl IntoIterator<Item = (String, I)>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut sorted: Vec<(String, I)> = entries
            .into_iter()
            .filter(|(k, _)| !k.is_empty() && seen.insert(k.clone()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let exact = sorted
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
        Self { exact, sorted }
    }

    pub fn get(&self, key: &str) -> Option<&I> {
        self.exact.get(key).map(|&i| &self.sorted[i].1)
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &I)> {
        self.sorted.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resolution strategies
// ---------------------------------------------------------------------------

/// Strategy for matching a normalized query against a name index.
pub trait NameResolver {
    fn resolve<'a, I>(&self, query: &str, index: &'a NameIndex<I>) -> Option<&'a I>;
}

/// Normalized equality only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactResolver;

impl NameResolver for ExactResolver {
    fn resolve<'a, I>(&self, query: &str, index: &'a NameIndex<I>) -> Option<&'a I> {
        index.get(query)
    }
}

/// Normalized equality, then a linear scan for the first key (in sorted
/// order) that contains the query or is contained in it.
#[derive(Debug, Clone, Copy)]
pub struct SubstringResolver {
    /// Queries and keys shorter than this never substring-match.
    pub min_len: usize,
}

impl Default for SubstringResolver {
    fn default() -> Self {
        Self { min_len: 4 }
    }
}

impl NameResolver for SubstringResolver {
    fn resolve<'a, I>(&self, query: &str, index: &'a NameIndex<I>) -> Option<&'a I> {
        if let Some(hit) = index.get(query) {
            return Some(hit);
        }
        if query.chars().count() < self.min_len {
            return None;
        }
        index
            .entries()
            .find(|(key, _)| {
                key.contains(query) || (key.chars().count() >= self.min_len && query.contains(key))
            })
            .map(|(_, id)| id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
