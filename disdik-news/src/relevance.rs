//! Keyword relevance classification
//!
//! An entry is relevant when it mentions the organization and mentions no
//! negative term. Positive terms are reported but never required.

/// Organization terms: at least one must match
pub const ORGANIZATION_KEYWORDS: &[&str] = &[
    "dinas pendidikan kabupaten gowa",
    "disdik gowa",
    "disdik kabupaten gowa",
    "pemkab gowa",
    "pendidikan gowa",
    "kab gowa",
];

/// Negative terms: any match vetoes the entry
pub const NEGATIVE_KEYWORDS: &[&str] = &[
    "korupsi", "kecelakaan", "bencana", "demo", "aksi", "pungli", "hoaks", "hoax",
    "kekerasan", "bully", "perkelahian", "baku hantam", "baku pukul", "kriminal",
    "narkoba", "penipuan", "negatif", "turun", "gagal", "gugur", "jatuh", "mati",
];

/// Positive terms: informational only
pub const POSITIVE_KEYWORDS: &[&str] = &[
    "sukses", "penghargaan", "prestasi", "apresiasi", "inovasi", "juara", "terbaik",
    "peresmian", "peningkatan", "launching", "diluncurkan", "kerja sama", "kolaborasi",
    "kurikulum merdeka", "beasiswa", "lulus", "wisuda", "terverifikasi", "akreditasi",
    "pembangunan", "renovasi", "bantuan", "donasi", "positif", "berhasil", "naik",
];

/// Terms matched in one piece of text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relevance {
    pub organization: Option<String>,
    pub negative: Option<String>,
    pub positive: Option<String>,
}

impl Relevance {
    /// Organization gate passed and no negative veto
    pub fn is_relevant(&self) -> bool {
        self.organization.is_some() && self.negative.is_none()
    }
}

/// Case-insensitive substring classifier over three keyword sets
#[derive(Debug, Clone)]
pub struct RelevanceClassifier {
    organization: Vec<String>,
    negative: Vec<String>,
    positive: Vec<String>,
}

impl Default for RelevanceClassifier {
    fn default() -> Self {
        Self::new(ORGANIZATION_KEYWORDS, NEGATIVE_KEYWORDS, POSITIVE_KEYWORDS)
    }
}

impl RelevanceClassifier {
    pub fn new<S: AsRef<str>>(organization: &[S], negative: &[S], positive: &[S]) -> Self {
        Self {
            organization: normalize(organization),
            negative: normalize(negative),
            positive: normalize(positive),
        }
    }

    /// Report the first matching term of each set
    pub fn classify(&self, text: &str) -> Relevance {
        let text = text.to_lowercase();
        Relevance {
            organization: first_match(&text, &self.organization),
            negative: first_match(&text, &self.negative),
            positive: first_match(&text, &self.positive),
        }
    }

    pub fn is_relevant(&self, text: &str) -> bool {
        self.classify(text).is_relevant()
    }
}

fn normalize<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn first_match(text: &str, terms: &[String]) -> Option<String> {
    terms.iter().find(|t| text.contains(t.as_str())).cloned()
}
