//! Static fallback posting times, used when an owner has no engagement
//! history to score.

use chrono::Weekday;

use cadence_queue::DestinationKind;
use cadence_store::OptimalTimeSuggestion;

/// Industry-default (weekday, hour) pairs per platform, best first.
///
/// These mirror commonly observed engagement peaks: mornings and evenings
/// for the microblogging platforms, midday for the visual ones.
fn default_hours(kind: Option<DestinationKind>) -> &'static [(Weekday, u8)] {
    match kind {
        Some(DestinationKind::Bluesky) => &[
            (Weekday::Tue, 9),
            (Weekday::Wed, 12),
            (Weekday::Thu, 18),
            (Weekday::Sat, 21),
        ],
        Some(DestinationKind::Mastodon) => &[
            (Weekday::Mon, 8),
            (Weekday::Wed, 13),
            (Weekday::Fri, 19),
            (Weekday::Sun, 21),
        ],
        Some(DestinationKind::Instagram) => &[
            (Weekday::Mon, 11),
            (Weekday::Wed, 12),
            (Weekday::Fri, 17),
            (Weekday::Sun, 19),
        ],
        Some(DestinationKind::Twitter) => &[
            (Weekday::Tue, 8),
            (Weekday::Wed, 9),
            (Weekday::Thu, 12),
            (Weekday::Fri, 17),
        ],
        // Unknown platform: a generic morning/midday/evening/night spread
        None => &[
            (Weekday::Mon, 9),
            (Weekday::Wed, 12),
            (Weekday::Thu, 18),
            (Weekday::Sat, 21),
        ],
    }
}

/// Build fallback suggestions for a destination. Scores are zero to make
/// clear they carry no observed engagement.
pub fn default_suggestions(
    destination_id: &str,
    kind: Option<DestinationKind>,
) -> Vec<OptimalTimeSuggestion> {
    default_hours(kind)
        .iter()
        .map(|&(weekday, hour)| OptimalTimeSuggestion {
            destination_id: destination_id.to_string(),
            weekday,
            hour,
            score: 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_exist_for_every_kind() {
        for kind in [
            DestinationKind::Bluesky,
            DestinationKind::Mastodon,
            DestinationKind::Instagram,
            DestinationKind::Twitter,
        ] {
            let suggestions = default_suggestions("acct", Some(kind));
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.hour < 24 && s.score == 0.0));
        }
        assert!(!default_suggestions("acct", None).is_empty());
    }
}
