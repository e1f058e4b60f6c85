// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyword vocabulary and transcript normalization.
//!
//! Keywords are stored in normalized Latin form; transcripts are
//! case-folded, stripped of punctuation, and transliterated from
//! Devanagari before matching. Matching is whole-word or bigram
//! substring — never mid-word. The shipped lists are defaults; callers
//! may inject their own vocabulary at construction.

/// Per-category keyword lists in normalized form.
#[derive(Debug, Clone)]
pub struct Lexicon {
    pub threat: Vec<String>,
    pub distress: Vec<String>,
    /// Politeness markers that tilt emotion toward distressed without
    /// driving the `help` intent.
    pub plea: Vec<String>,
    pub scam: Vec<String>,
    pub occupancy: Vec<String>,
    pub identity: Vec<String>,
    pub entry: Vec<String>,
    pub government: Vec<String>,
    pub staff: Vec<String>,
    pub religious: Vec<String>,
    pub sales: Vec<String>,
    pub child_elder: Vec<String>,
    pub hydration: Vec<String>,
    pub delivery: Vec<String>,
    pub visitor: Vec<String>,
}

fn list(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_owned()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            threat: list(&[
                "kill", "attack", "hurt", "beat you", "break the door", "smash", "shoot",
                "maar dunga", "tod dunga", "jaan se", "dhamki", "barbaad",
            ]),
            distress: list(&[
                "help", "emergency", "scared", "save me", "bachao", "madad", "darr",
            ]),
            plea: list(&["please", "kripya"]),
            scam: list(&[
                "otp", "verification code", "verify your", "upi", "qr code", "scan this",
                "bank account", "account number", "refund", "collect the refund", "kyc",
                "aadhaar", "aadhar card", "lottery", "prize money",
            ]),
            occupancy: list(&[
                "anyone home", "anybody home", "is anyone", "home alone", "koi ghar",
                "ghar pe hai", "ghar par hai", "akele ho",
            ]),
            identity: list(&[
                "know the owner", "i know the owner", "relative", "owner told me",
                "rishtedaar", "malik ne bulaya", "family friend",
            ]),
            entry: list(&[
                "let me in", "open the door", "unlock", "open the gate", "come inside",
                "darvaja kholo", "darwaza kholo", "gate kholo", "andar aane", "open up",
            ]),
            government: list(&[
                "electricity", "gas connection", "water board", "police", "tax",
                "inspection", "meter reading", "bijli", "sarkari", "municipal", "survey",
            ]),
            staff: list(&[
                "maid", "driver", "cook", "helper", "kaamwali", "naukar", "mali",
                "safai", "bai aayi",
            ]),
            religious: list(&[
                "temple", "mandir", "church", "gurudwara", "masjid", "festival",
                "donation", "chanda", "prasad", "pooja",
            ]),
            sales: list(&[
                "demo", "policy", "offer", "discount", "sales", "marketing", "insurance",
                "free trial", "scheme", "new product",
            ]),
            child_elder: list(&[
                "child", "kid", "beta", "baccha", "grandma", "grandpa", "dadi", "nani",
                "elderly", "old man", "old woman",
            ]),
            hydration: list(&["water", "paani", "thirsty", "pyaas", "hungry", "bhook"]),
            delivery: list(&[
                "package", "parcel", "courier", "delivery", "cod", "cash on delivery",
                "amazon", "flipkart", "your order", "shipment",
            ]),
            visitor: list(&[
                "meet", "appointment", "friend", "family", "visiting", "guest",
                "milne aaya", "milne aayi",
            ]),
        }
    }
}

impl Lexicon {
    /// True when any keyword in `keywords` appears in the normalized
    /// transcript as a whole word or bigram.
    pub fn any(&self, keywords: &[String], normalized: &str) -> bool {
        let padded = format!(" {normalized} ");
        keywords.iter().any(|kw| padded.contains(&format!(" {kw} ")))
    }

    pub fn has_threat(&self, normalized: &str) -> bool {
        self.any(&self.threat, normalized)
    }

    pub fn has_distress(&self, normalized: &str) -> bool {
        self.any(&self.distress, normalized)
    }

    /// Distress for emotion purposes: distress vocabulary or a bare plea.
    pub fn sounds_distressed(&self, normalized: &str) -> bool {
        self.has_distress(normalized) || self.any(&self.plea, normalized)
    }

    pub fn has_entry(&self, normalized: &str) -> bool {
        self.any(&self.entry, normalized)
    }
}

// -- Normalization ------------------------------------------------------------

/// True when the text contains any codepoint in the Devanagari block.
pub fn has_devanagari(text: &str) -> bool {
    text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c))
}

/// Normalize a transcript for keyword matching: case-fold, transliterate
/// Devanagari to Latin, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let transliterated =
        if has_devanagari(&lowered) { transliterate(&lowered) } else { lowered };

    let mut out = String::with_capacity(transliterated.len());
    let mut last_space = true;
    for c in transliterated.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_owned()
}

/// Transliterate Devanagari text to Latin.
///
/// Consonants carry an inherent `a` that is emitted before the next
/// consonant, suppressed by a matra or virama, and dropped word-finally
/// (schwa deletion). The scheme is deliberately rough — it exists to
/// make keyword matching work, not to be philologically correct.
pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_a = false;

    let flush = |out: &mut String, pending: &mut bool| {
        if *pending {
            out.push('a');
            *pending = false;
        }
    };

    for c in text.chars() {
        if let Some(latin) = consonant(c) {
            flush(&mut out, &mut pending_a);
            out.push_str(latin);
            pending_a = true;
        } else if let Some(vowel) = matra(c) {
            out.push_str(vowel);
            pending_a = false;
        } else if let Some(vowel) = independent_vowel(c) {
            flush(&mut out, &mut pending_a);
            out.push_str(vowel);
        } else if c == '\u{094D}' {
            // Virama: suppress the inherent vowel.
            pending_a = false;
        } else if c == '\u{0902}' || c == '\u{0901}' {
            // Anusvara / chandrabindu: nasal.
            flush(&mut out, &mut pending_a);
            out.push('n');
        } else if c == '\u{093C}' {
            // Combining nukta: ignore.
        } else if ('\u{0900}'..='\u{097F}').contains(&c) {
            // Danda, nukta, other marks: word break.
            pending_a = false;
            out.push(' ');
        } else {
            // Word boundary: final schwa deletion.
            pending_a = false;
            out.push(c);
        }
    }

    out
}

fn consonant(c: char) -> Option<&'static str> {
    Some(match c {
        'क' => "k",
        'ख' => "kh",
        'ग' => "g",
        'घ' => "gh",
        'च' => "ch",
        'छ' => "chh",
        'ज' => "j",
        'झ' => "jh",
        'ट' | 'त' => "t",
        'ठ' | 'थ' => "th",
        'ड' | 'द' => "d",
        'ढ' | 'ध' => "dh",
        'ण' | 'न' | 'ङ' | 'ञ' => "n",
        'प' => "p",
        'फ' => "ph",
        'ब' => "b",
        'भ' => "bh",
        'म' => "m",
        'य' => "y",
        'र' => "r",
        'ल' => "l",
        'व' => "v",
        'श' | 'ष' => "sh",
        'स' => "s",
        'ह' => "h",
        _ => return None,
    })
}

fn matra(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{093E}' => "a",  // ा
        '\u{093F}' | '\u{0940}' => "i", // ि ी
        '\u{0941}' | '\u{0942}' => "u", // ु ू
        '\u{0947}' => "e",  // े
        '\u{0948}' => "ai", // ै
        '\u{094B}' => "o",  // ो
        '\u{094C}' => "au", // ौ
        _ => return None,
    })
}

fn independent_vowel(c: char) -> Option<&'static str> {
    Some(match c {
        'अ' => "a",
        'आ' => "aa",
        'इ' | 'ई' => "i",
        'उ' | 'ऊ' => "u",
        'ए' => "e",
        'ऐ' => "ai",
        'ओ' => "o",
        'औ' => "au",
        _ => return None,
    })
}

#[cfg(test)]
#[path = "lexicon_tests.rs"]
mod tests;
