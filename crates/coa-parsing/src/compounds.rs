use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{NameDigitException, ParsingConfig};
use crate::normalize::normalize_delta;

/// Canonical cannabinoid names a label may resolve to.
pub const DEFAULT_COMPOUNDS: &[&str] = &[
    "CBC", "CBCA", "CBCV", "CBD", "CBDA", "CBDB", "CBDP", "CBDV", "CBDVA",
    "CBG", "CBGA", "CBL", "CBLA", "CBN", "CBNA", "CBT",
    "Δ8-THC", "Δ8-THCA", "Δ8-THCB", "Δ8-THC-C8", "Δ8-THCH", "Δ8-THCP", "Δ8-THCV",
    "Δ9-THC", "Δ9-THCA", "Δ9-THCB", "Δ9-THC-C8", "Δ9-THCH", "Δ9-THCP", "Δ9-THCV", "Δ9-THCVA",
    "Δ4,8-iso-THC", "Δ8-iso-THC", "Δ10-THC", "Δ6a,10a-THC", "Δ7-THC",
    "THCA", "THCVA", "THCOA", "THCBA", "THCB", "THCH", "THCP", "THCPV",
    "(6aR,9R,10aR)-HHC", "(6aR,9S,10aR)-HHC", "HHC",
    "(6aR,9R,10aR)-HHCo", "(6aR,9S,10aR)-HHCo", "HHCo", "HHC-o",
    "9R-HHCP", "9S-HHCP", "HHCP",
    "(6aR,9R,10aR)-HHC acetate", "(6aR,9S,10aR)-HHC acetate",
    "9R-HHCP acetate", "9S-HHCP acetate",
    "CBN acetate", "CBC acetate", "CBD acetate", "CBG acetate",
    "Δ8-THC acetate", "Δ9-THC acetate", "THCA acetate", "CBDA acetate", "CBGA acetate",
    "Total THC", "Total Δ9-THC", "Total Δ8-THC", "Total CBD", "Total CBG", "Total CBN",
    "Total CBC", "Total Cannabinoids", "Total",
];

/// Printed labels that resolve to a canonical name they do not spell.
pub const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("Delta 8", "Δ8-THC"),
    ("Delta 9", "Δ9-THC"),
    ("Delta 10", "Δ10-THC"),
    ("Delta-8 THC", "Δ8-THC"),
    ("Delta-9 THC", "Δ9-THC"),
    ("D8-THC", "Δ8-THC"),
    ("D9-THC", "Δ9-THC"),
    ("9R-HHC", "(6aR,9R,10aR)-HHC"),
    ("9S-HHC", "(6aR,9S,10aR)-HHC"),
];

/// Words whose following digit is part of the compound name.
pub const DEFAULT_NAME_DIGIT_EXCEPTIONS: &[(&str, usize)] = &[("Delta", 1)];

/// Report furniture that shows up where a peak label would be.
static JUNK_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:Reporte|Chromeleon|Injection|Page|P[aá]gina|Method)\b").unwrap());

/// Labels starting with a stereo descriptor (`(6aR,...)`, `9R-`, `9S-`)
/// are matched case-sensitively: `9R` and `9r` are not the same thing.
static STEREO_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\(|\d+[RS]-)").unwrap());

#[derive(Debug, Clone)]
struct Entry {
    label: String,
    canonical: String,
    case_sensitive: bool,
}

impl Entry {
    fn new(label: &str, canonical: &str) -> Self {
        let label = normalize_delta(label.trim());
        Self {
            case_sensitive: STEREO_PREFIX_RE.is_match(&label),
            canonical: normalize_delta(canonical.trim()),
            label,
        }
    }

    /// Does `text` start with this label followed by whitespace or the end?
    fn prefix_of(&self, text: &str) -> bool {
        let Some(head) = text.get(..self.label.len()) else {
            return false;
        };
        let same = if self.case_sensitive {
            head == self.label
        } else {
            head.eq_ignore_ascii_case(&self.label)
        };
        same && text[self.label.len()..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace)
    }
}

/// A canonical name found at the start of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadingCompound<'a> {
    pub canonical: String,
    /// The label as printed in the line.
    pub label: &'a str,
    /// Everything after the label.
    pub rest: &'a str,
}

/// Maps free-text compound labels to canonical cannabinoid names.
///
/// Entries are tried longest label first so `(6aR,9R,10aR)-HHC acetate`
/// wins over `(6aR,9R,10aR)-HHC` and `CBDA` over `CBD`.
#[derive(Debug, Clone)]
pub struct CompoundResolver {
    entries: Vec<Entry>,
    digit_exceptions: Vec<NameDigitException>,
    max_label_len: usize,
    junk_label_re: Option<Regex>,
}

impl Default for CompoundResolver {
    fn default() -> Self {
        Self::from_config(&ParsingConfig::default())
    }
}

impl CompoundResolver {
    pub fn from_config(config: &ParsingConfig) -> Self {
        let default_names: Vec<String> = DEFAULT_COMPOUNDS.iter().map(|s| s.to_string()).collect();
        let default_aliases: Vec<(String, String)> = DEFAULT_ALIASES
            .iter()
            .map(|(l, c)| (l.to_string(), c.to_string()))
            .collect();
        let default_exceptions: Vec<NameDigitException> = DEFAULT_NAME_DIGIT_EXCEPTIONS
            .iter()
            .map(|(w, d)| NameDigitException::new(w, *d))
            .collect();

        let mut entries: Vec<Entry> = config
            .compound_names
            .resolve(&default_names)
            .iter()
            .map(|name| Entry::new(name, name))
            .chain(
                config
                    .compound_aliases
                    .resolve(&default_aliases)
                    .iter()
                    .map(|(label, canonical)| Entry::new(label, canonical)),
            )
            .filter(|e| !e.label.is_empty())
            .collect();

        entries.sort_by(|a, b| {
            b.label
                .len()
                .cmp(&a.label.len())
                .then_with(|| a.label.cmp(&b.label))
        });
        entries.dedup_by(|a, b| a.label == b.label);

        Self {
            entries,
            digit_exceptions: config.name_digit_exceptions.resolve(&default_exceptions),
            max_label_len: config.max_label_len,
            junk_label_re: config.junk_label_re.clone(),
        }
    }

    /// Canonical name for a whole label: exact match first, then the longest
    /// reference name the label starts with.
    pub fn canonicalize(&self, label: &str) -> Option<&str> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        let exact = self.entries.iter().find(|e| {
            if e.case_sensitive {
                e.label == label
            } else {
                e.label.eq_ignore_ascii_case(label)
            }
        });
        exact
            .or_else(|| self.entries.iter().find(|e| e.prefix_of(label)))
            .map(|e| e.canonical.as_str())
    }

    /// Longest reference label at the start of `line`, if any.
    pub fn split_leading<'a>(&self, line: &'a str) -> Option<LeadingCompound<'a>> {
        let line = line.trim_start();
        self.entries.iter().find(|e| e.prefix_of(line)).map(|e| {
            let (label, rest) = line.split_at(e.label.len());
            LeadingCompound {
                canonical: e.canonical.clone(),
                label,
                rest: rest.trim_start(),
            }
        })
    }

    /// How many digits of a digit run glued to `name` belong to the name.
    ///
    /// Only the words in the exception table qualify (`Delta` + one digit);
    /// anything else gets zero and the whole run goes to the number.
    pub fn name_owned_digits(&self, name: &str) -> usize {
        let Some(last_word) = name.split_whitespace().next_back() else {
            return 0;
        };
        self.digit_exceptions
            .iter()
            .find(|ex| ex.word.eq_ignore_ascii_case(last_word))
            .map_or(0, |ex| ex.digits)
    }

    /// Labels that are page furniture rather than a compound or peak name.
    pub fn is_junk_label(&self, label: &str) -> bool {
        if label.chars().count() > self.max_label_len {
            return true;
        }
        match &self.junk_label_re {
            Some(re) => re.is_match(label),
            None => JUNK_LABEL_RE.is_match(label),
        }
    }
}
