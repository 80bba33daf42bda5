/// A named family of lower-cased keywords with a base confidence, either
/// built in or created from feedback (`learned_<n>`) (spec.md §4.E).
#[derive(Debug, Clone)]
pub struct PatternFamily {
    pub name: String,
    pub keywords: Vec<String>,
    pub base_confidence: f64,
}

impl PatternFamily {
    pub fn builtin(name: &str, keywords: &[&str], base_confidence: f64) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            base_confidence,
        }
    }

    /// Count of this family's keywords present in `lower_text`.
    pub fn match_count(&self, lower_text: &str) -> usize {
        self.keywords
            .iter()
            .filter(|kw| lower_text.contains(kw.as_str()))
            .count()
    }
}

/// The five built-in pattern families (spec.md §4.E).
pub fn builtin_families() -> Vec<PatternFamily> {
    vec![
        PatternFamily::builtin(
            "highRisk",
            &[
                "delete",
                "drop table",
                "rm -rf",
                "force push",
                "production",
                "credentials",
                "secret key",
                "revoke access",
            ],
            0.70,
        ),
        PatternFamily::builtin(
            "design",
            &[
                "architecture",
                "schema change",
                "api contract",
                "breaking change",
                "migration plan",
                "redesign",
            ],
            0.55,
        ),
        PatternFamily::builtin(
            "manualTest",
            &[
                "manual verification",
                "visual check",
                "exploratory test",
                "ux review",
                "accessibility audit",
            ],
            0.50,
        ),
        PatternFamily::builtin(
            "strategic",
            &[
                "roadmap",
                "budget",
                "headcount",
                "vendor selection",
                "pricing",
                "go-to-market",
            ],
            0.60,
        ),
        PatternFamily::builtin(
            "legal",
            &[
                "compliance",
                "gdpr",
                "license agreement",
                "terms of service",
                "data retention",
                "regulatory",
            ],
            0.65,
        ),
    ]
}

/// Tokens too common or too short to seed a learned pattern.
pub const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "have", "has", "are", "was",
    "were", "will", "shall", "should", "could", "would", "our", "you", "your", "about", "its",
    "add", "new", "use", "using", "make", "need", "needs", "task", "please", "when", "then",
];
