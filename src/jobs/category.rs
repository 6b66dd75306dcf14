//! Stem name -> category, for grouping the track list and picking mashup stems

use std::fmt;

use indexmap::IndexMap;

use crate::store::AudioTrack;

/// Tracks pre-selected for a mashup when the user has chosen none.
pub const AUTO_SELECT_LIMIT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StemCategory {
    Vocals,
    Instruments,
    Rhythm,
    Effects,
    Other,
}

impl StemCategory {
    /// Display order of the grouped track list.
    pub const ALL: [StemCategory; 5] = [
        StemCategory::Vocals,
        StemCategory::Instruments,
        StemCategory::Rhythm,
        StemCategory::Effects,
        StemCategory::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StemCategory::Vocals => "Vocals",
            StemCategory::Instruments => "Instruments",
            StemCategory::Rhythm => "Rhythm",
            StemCategory::Effects => "Effects",
            StemCategory::Other => "Other",
        }
    }
}

impl fmt::Display for StemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// "Lead Vocals" and "lead-vocals" both become "lead_vocals".
fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Unknown stem names fall into `Other`.
pub fn stem_category(stem_name: &str) -> StemCategory {
    match normalize(stem_name).as_str() {
        "vocals" | "lead_vocals" | "backing_vocals" | "choir" => StemCategory::Vocals,
        "piano" | "synth" | "guitar" | "electric_guitar" | "acoustic_guitar" | "strings"
        | "brass" => StemCategory::Instruments,
        "drums" | "kick" | "snare" | "hihat" | "percussion" | "bass" => StemCategory::Rhythm,
        "atmosphere" | "noise" | "reverb" => StemCategory::Effects,
        _ => StemCategory::Other,
    }
}

/// Non-empty groups in `StemCategory::ALL` order, tracks in their original order.
pub fn group_by_category(tracks: &[AudioTrack]) -> IndexMap<StemCategory, Vec<&AudioTrack>> {
    let mut groups: IndexMap<StemCategory, Vec<&AudioTrack>> =
        StemCategory::ALL.iter().map(|c| (*c, Vec::new())).collect();
    for track in tracks {
        if let Some(group) = groups.get_mut(&stem_category(&track.name)) {
            group.push(track);
        }
    }
    groups.retain(|_, group| !group.is_empty());
    groups
}

/// Ids of the first vocal or instrument tracks, up to `AUTO_SELECT_LIMIT`.
pub fn auto_mashup_selection(tracks: &[AudioTrack]) -> Vec<String> {
    tracks
        .iter()
        .filter(|t| {
            matches!(
                stem_category(&t.name),
                StemCategory::Vocals | StemCategory::Instruments
            )
        })
        .take(AUTO_SELECT_LIMIT)
        .map(|t| t.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::materialize::track_id;
    use crate::store::DEFAULT_TRACK_VOLUME;

    fn tracks(names: &[&str]) -> Vec<AudioTrack> {
        names
            .iter()
            .map(|name| AudioTrack {
                id: track_id("job1", name),
                name: name.to_string(),
                url: format!("/files/{}.wav", name),
                duration: 10.0,
                volume: DEFAULT_TRACK_VOLUME,
                pan: 0.0,
                muted: false,
                solo: false,
                color: "#6366f1".into(),
                waveform_data: None,
            })
            .collect()
    }

    #[test]
    fn test_stem_category() {
        assert_eq!(stem_category("vocals"), StemCategory::Vocals);
        assert_eq!(stem_category("Lead Vocals"), StemCategory::Vocals);
        assert_eq!(stem_category("electric-guitar"), StemCategory::Instruments);
        assert_eq!(stem_category("bass"), StemCategory::Rhythm);
        assert_eq!(stem_category("HiHat"), StemCategory::Rhythm);
        assert_eq!(stem_category("reverb"), StemCategory::Effects);
        assert_eq!(stem_category("other"), StemCategory::Other);
        assert_eq!(stem_category("theremin"), StemCategory::Other);
    }

    #[test]
    fn test_groups_follow_category_order() {
        let tracks = tracks(&["drums", "other", "vocals", "bass", "piano"]);
        let groups = group_by_category(&tracks);

        let order: Vec<StemCategory> = groups.keys().copied().collect();
        assert_eq!(
            order,
            vec![
                StemCategory::Vocals,
                StemCategory::Instruments,
                StemCategory::Rhythm,
                StemCategory::Other
            ]
        );
        let rhythm: Vec<&str> = groups[&StemCategory::Rhythm]
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(rhythm, vec!["drums", "bass"]);
        assert!(!groups.contains_key(&StemCategory::Effects));
    }

    #[test]
    fn test_auto_selection_prefers_melodic_stems() {
        let full_band = tracks(&[
            "drums", "vocals", "bass", "piano", "choir", "guitar", "synth", "other",
        ]);
        assert_eq!(
            auto_mashup_selection(&full_band),
            vec!["job1_vocals", "job1_piano", "job1_choir", "job1_guitar"]
        );

        let rhythm_only = tracks(&["drums", "bass"]);
        assert!(auto_mashup_selection(&rhythm_only).is_empty());
    }
}
