use std::cmp::Ordering;

/// ピン留め可能なバージョン（`2.2.0` のような数値のドット区切り）かどうか。
pub fn is_pinned_version(text: &str) -> bool {
    !text.is_empty()
        && text
            .split('.')
            .all(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Dev,
    Alpha,
    Beta,
    Candidate,
    Final,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedVersion {
    release: Vec<u64>,
    phase: Phase,
    phase_number: u64,
}

impl ParsedVersion {
    fn parse(text: &str) -> Self {
        let lowered = text.trim().to_ascii_lowercase();
        let public = lowered.split('+').next().unwrap_or_default();
        let public = public.strip_prefix('v').unwrap_or(public);

        let split_at = public
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(public.len());
        let (release_part, suffix) = public.split_at(split_at);

        let release = release_part
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u64>().unwrap_or(0))
            .collect();

        let suffix = suffix.trim_start_matches(['.', '-', '_']);
        let label_end = suffix
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(suffix.len());
        let (label, number) = suffix.split_at(label_end);
        let label = label.trim_end_matches(['.', '-', '_']);

        let phase = match label {
            "" => Phase::Final,
            "dev" => Phase::Dev,
            "a" | "alpha" => Phase::Alpha,
            "b" | "beta" => Phase::Beta,
            "rc" | "c" | "pre" | "preview" => Phase::Candidate,
            "post" | "rev" | "r" => Phase::Post,
            _ => Phase::Final,
        };
        let phase_number = number
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .unwrap_or(0);

        Self {
            release,
            phase,
            phase_number,
        }
    }
}

/// PyPIのバージョン文字列を比較する。リリース部は0埋めで比較し、
/// プレリリースは正式版より前、`.postN` は正式版より後に並ぶ。
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = ParsedVersion::parse(a);
    let right = ParsedVersion::parse(b);

    let width = left.release.len().max(right.release.len());
    for idx in 0..width {
        let l = left.release.get(idx).copied().unwrap_or(0);
        let r = right.release.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    left.phase
        .cmp(&right.phase)
        .then(left.phase_number.cmp(&right.phase_number))
}

pub fn is_prerelease(text: &str) -> bool {
    matches!(
        ParsedVersion::parse(text).phase,
        Phase::Dev | Phase::Alpha | Phase::Beta | Phase::Candidate
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_versions_are_dotted_numeric() {
        assert!(is_pinned_version("2.2.0"));
        assert!(is_pinned_version("14.0.2"));
        assert!(is_pinned_version("3"));
        assert!(!is_pinned_version(""));
        assert!(!is_pinned_version("2.2."));
        assert!(!is_pinned_version("2..2"));
        assert!(!is_pinned_version("2.0.0rc1"));
        assert!(!is_pinned_version("v1.0"));
    }

    #[test]
    fn compare_pads_release_segments() {
        assert_eq!(compare("1.26.4", "1.26.2"), Ordering::Greater);
        assert_eq!(compare("2.2", "2.2.0"), Ordering::Equal);
        assert_eq!(compare("3.3.9", "3.3.10"), Ordering::Less);
        assert_eq!(compare("14.0.2", "9.9.9"), Ordering::Greater);
    }

    #[test]
    fn compare_orders_pre_and_post_releases() {
        assert_eq!(compare("2.0.0rc1", "2.0.0"), Ordering::Less);
        assert_eq!(compare("2.0.0b2", "2.0.0rc1"), Ordering::Less);
        assert_eq!(compare("1.0.dev3", "1.0a1"), Ordering::Less);
        assert_eq!(compare("2.8.2.post1", "2.8.2"), Ordering::Greater);
        assert_eq!(compare("1.0+local", "1.0"), Ordering::Equal);
    }

    #[test]
    fn prerelease_detection() {
        assert!(is_prerelease("3.0.0b1"));
        assert!(is_prerelease("4.0.0.dev0"));
        assert!(!is_prerelease("2.2.0"));
        assert!(!is_prerelease("2.8.2.post1"));
    }
}
