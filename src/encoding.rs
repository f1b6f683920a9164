//! Text decoding for WHOIS replies.
//!
//! WHOIS servers answer in whatever charset the registry happens to use. The
//! resolver tries the caller's declared encoding first, then asks an
//! [`EncodingDetector`] for ranked candidates and decodes with the best one.

use crate::errors::WhoisError;
use encoding_rs::{DecoderResult, Encoding, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{debug, warn};

/// What to do with byte sequences that are invalid in the chosen encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    Strict,
    Replace,
    Ignore,
}

impl ErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPolicy::Strict => "strict",
            ErrorPolicy::Replace => "replace",
            ErrorPolicy::Ignore => "ignore",
        }
    }

    /// Policy used when the detector is not sure about its guess.
    fn permissive(self) -> Self {
        match self {
            ErrorPolicy::Strict => ErrorPolicy::Replace,
            other => other,
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ErrorPolicy::Strict),
            "replace" => Ok(ErrorPolicy::Replace),
            "ignore" => Ok(ErrorPolicy::Ignore),
            other => Err(format!("unknown encoding error policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingCandidate {
    pub encoding: &'static Encoding,
    pub confidence: f32,
}

/// Ranks possible encodings for a byte buffer, best first.
pub trait EncodingDetector: Send + Sync {
    fn detect(&self, bytes: &[u8]) -> Vec<EncodingCandidate>;
}

/// Statistical detection backed by `chardetng`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChardetngDetector;

impl EncodingDetector for ChardetngDetector {
    fn detect(&self, bytes: &[u8]) -> Vec<EncodingCandidate> {
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(bytes, true);
        let guess = detector.guess(None, true);

        // chardetng gives no score, so grade the guess by whether it decodes cleanly.
        let (_, _, had_errors) = guess.decode(bytes);
        let confidence = if had_errors { 0.25 } else { 0.8 };

        let mut candidates = vec![EncodingCandidate { encoding: guess, confidence }];
        if guess != WINDOWS_1252 {
            candidates.push(EncodingCandidate { encoding: WINDOWS_1252, confidence: 0.1 });
        }
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates
    }
}

/// How a response was decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingDecision {
    pub encoding: String,
    pub confidence: f32,
    pub error_policy: ErrorPolicy,
    pub had_errors: bool,
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub decision: EncodingDecision,
}

#[derive(Clone)]
pub struct EncodingResolver {
    detector: Arc<dyn EncodingDetector>,
    policy: ErrorPolicy,
    threshold: f32,
}

impl fmt::Debug for EncodingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingResolver")
            .field("policy", &self.policy)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl EncodingResolver {
    pub fn new(policy: ErrorPolicy, threshold: f32) -> Self {
        Self::with_detector(Arc::new(ChardetngDetector), policy, threshold)
    }

    pub fn with_detector(detector: Arc<dyn EncodingDetector>, policy: ErrorPolicy, threshold: f32) -> Self {
        Self { detector, policy, threshold }
    }

    /// Same detector and threshold, different error policy.
    pub fn with_policy(&self, policy: ErrorPolicy) -> Self {
        Self {
            detector: self.detector.clone(),
            policy,
            threshold: self.threshold,
        }
    }

    pub fn decode(&self, bytes: &[u8], declared: Option<&str>) -> Result<Decoded, WhoisError> {
        if let Some(label) = declared {
            match Encoding::for_label(label.trim().as_bytes()) {
                Some(encoding) => {
                    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
                    if !had_errors {
                        return Ok(Decoded {
                            text: text.into_owned(),
                            decision: EncodingDecision {
                                encoding: encoding.name().to_string(),
                                confidence: 1.0,
                                error_policy: self.policy,
                                had_errors: false,
                            },
                        });
                    }
                    debug!("Declared encoding {} failed, falling back to detection", encoding.name());
                }
                None => warn!("Unknown declared encoding '{}', falling back to detection", label),
            }
        }

        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok(Decoded {
                text: text.to_string(),
                decision: EncodingDecision {
                    encoding: UTF_8.name().to_string(),
                    confidence: 1.0,
                    error_policy: self.policy,
                    had_errors: false,
                },
            });
        }

        let best = self
            .detector
            .detect(bytes)
            .into_iter()
            .next()
            .unwrap_or(EncodingCandidate { encoding: UTF_8, confidence: 0.0 });

        let policy = if best.confidence >= self.threshold {
            self.policy
        } else {
            debug!(
                "Low confidence ({:.2}) for {}, decoding permissively",
                best.confidence,
                best.encoding.name()
            );
            self.policy.permissive()
        };

        let (text, had_errors) = best.encoding.decode_without_bom_handling(bytes);
        let text = if !had_errors {
            text.into_owned()
        } else {
            match policy {
                ErrorPolicy::Strict => {
                    return Err(WhoisError::Decode { encoding: best.encoding.name().to_string() });
                }
                ErrorPolicy::Replace => text.into_owned(),
                ErrorPolicy::Ignore => decode_skipping_malformed(best.encoding, bytes),
            }
        };

        Ok(Decoded {
            text,
            decision: EncodingDecision {
                encoding: best.encoding.name().to_string(),
                confidence: best.confidence,
                error_policy: policy,
                had_errors,
            },
        })
    }
}

fn decode_skipping_malformed(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let mut out = String::with_capacity(bytes.len() * 3 + 16);
    let mut input = bytes;

    loop {
        let (result, read) = decoder.decode_to_string_without_replacement(input, &mut out, true);
        input = &input[read..];
        match result {
            DecoderResult::InputEmpty => break,
            DecoderResult::OutputFull => out.reserve(input.len() * 3 + 16),
            DecoderResult::Malformed(_, _) => {}
        }
    }

    out
}
