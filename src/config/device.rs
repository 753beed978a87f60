//! Device identity.

use std::fmt;

/// Five-character uppercase code identifying the physical unit.
///
/// Used to build the topic namespace (`device/<ID>/`) and in every outbound
/// API payload. Always exactly [`DeviceId::LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub const LEN: usize = 5;

    /// Identity used when none (or an unusable one) is configured.
    pub const FALLBACK: &'static str = "FFFFF";

    /// Trims, uppercases and truncates `raw` to five characters.
    ///
    /// Falls back to [`DeviceId::FALLBACK`] when `raw` is unset, shorter than
    /// five characters after trimming, or contains a character that would
    /// break the topic namespace (`/`, `+`, `#`).
    pub fn resolve(raw: Option<&str>) -> Self {
        let candidate: String = raw
            .unwrap_or_default()
            .trim()
            .to_uppercase()
            .chars()
            .take(Self::LEN)
            .collect();

        let usable = candidate.chars().count() == Self::LEN
            && !candidate.contains(['/', '+', '#']);
        if usable {
            DeviceId(candidate)
        } else {
            DeviceId(Self::FALLBACK.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `device/<ID>/`, stripped from incoming topics.
    pub fn topic_prefix(&self) -> String {
        format!("device/{}/", self.0)
    }

    /// `device/<ID>/#`, the single subscription of the agent.
    pub fn topic_filter(&self) -> String {
        format!("device/{}/#", self.0)
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId(Self::FALLBACK.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uppercases_and_truncates() {
        assert_eq!(DeviceId::resolve(Some("ab12cd34")).as_str(), "AB12C");
        assert_eq!(DeviceId::resolve(Some("  x9y8z  ")).as_str(), "X9Y8Z");
    }

    #[test]
    fn test_resolve_falls_back() {
        assert_eq!(DeviceId::resolve(None).as_str(), "FFFFF");
        assert_eq!(DeviceId::resolve(Some("")).as_str(), "FFFFF");
        assert_eq!(DeviceId::resolve(Some("   ")).as_str(), "FFFFF");
        assert_eq!(DeviceId::resolve(Some("ab")).as_str(), "FFFFF");
        assert_eq!(DeviceId::resolve(Some("ab/cd")).as_str(), "FFFFF");
        assert_eq!(DeviceId::resolve(Some("ab#cd")).as_str(), "FFFFF");
    }

    #[test]
    fn test_resolved_id_is_always_five_uppercase_chars() {
        let inputs = [
            "a", "abcde", "abcdef", "12345", " 1a2b3c ", "ÄÖÜäöü", "déjà-vu", "tiny", "",
        ];
        for raw in inputs {
            let id = DeviceId::resolve(Some(raw));
            assert_eq!(id.as_str().chars().count(), DeviceId::LEN, "input {raw:?}");
            assert_eq!(id.as_str(), id.as_str().to_uppercase(), "input {raw:?}");
        }
    }

    #[test]
    fn test_topics() {
        let id = DeviceId::resolve(Some("ab123"));
        assert_eq!(id.topic_prefix(), "device/AB123/");
        assert_eq!(id.topic_filter(), "device/AB123/#");
    }
}
