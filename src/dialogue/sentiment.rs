//! Exit-intent / walk-away detection.
//!
//! Lowercase substring matching against two phrase lists. Angry phrases take
//! priority and trigger the save-the-deal flow at high confidence. Lists mix
//! English and Hindi-transliterated phrases, matching the bazaar persona.

// English + Hinglish exit signals
const EXIT_KEYWORDS: &[&str] = &[
    // English
    "too expensive",
    "too much",
    "too costly",
    "can't afford",
    "forget it",
    "never mind",
    "no thanks",
    "not interested",
    "i'll pass",
    "bye",
    "leaving",
    "going",
    "somewhere else",
    "another shop",
    "no deal",
    // Hindi / Hinglish (transliterated)
    "bohot mehenga",
    "bahut mehenga",
    "bahut zyada",
    "chhodo",
    "chodo",
    "jane do",
    "jaane do",
    "rehne do",
    "nahi chahiye",
    "nahi lena",
    "bahut hai",
    "itna nahi",
    "afford nahi",
    "budget nahi",
    "dusri dukaan",
    "kahi aur",
    "kahin aur",
];

const ANGRY_KEYWORDS: &[&str] = &[
    "waste of time",
    "scam",
    "rip off",
    "loot",
    "cheating",
    "loot rahe ho",
    "pagal bana rahe",
    "mazaak",
    "joke",
];

#[derive(Debug, Clone)]
pub struct ExitIntent {
    pub is_leaving: bool,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// Which keyword matched.
    pub trigger: String,
    pub is_angry: bool,
}

impl ExitIntent {
    fn none() -> Self {
        Self {
            is_leaving: false,
            confidence: 0.0,
            trigger: String::new(),
            is_angry: false,
        }
    }
}

/// Analyze a buyer message for exit intent. Run on the sanitised message so
/// redacted injection attempts cannot fake a walk-away.
pub fn detect_exit_intent(message: &str) -> ExitIntent {
    let text = message.to_lowercase();
    let text = text.trim();

    // Angry keywords first (higher priority)
    for kw in ANGRY_KEYWORDS {
        if text.contains(kw) {
            return ExitIntent {
                is_leaving: true,
                confidence: 0.9,
                trigger: (*kw).to_string(),
                is_angry: true,
            };
        }
    }

    let matches: Vec<&str> = EXIT_KEYWORDS
        .iter()
        .filter(|kw| text.contains(*kw))
        .copied()
        .collect();
    if let Some(first) = matches.first() {
        // More matches, higher confidence
        let confidence = (0.5 + 0.15 * matches.len() as f64).min(1.0);
        return ExitIntent {
            is_leaving: true,
            confidence,
            trigger: (*first).to_string(),
            is_angry: false,
        };
    }

    ExitIntent::none()
}
