//! Stem map -> editor tracks

use indexmap::IndexMap;

use crate::engine::types::StemInfo;
use crate::store::{AudioTrack, DEFAULT_TRACK_VOLUME};

/// Fixed track palette; a stem's color depends only on its position.
pub const TRACK_COLORS: [&str; 16] = [
    "#6366f1", // indigo
    "#ec4899", // pink
    "#10b981", // emerald
    "#f59e0b", // amber
    "#ef4444", // red
    "#8b5cf6", // violet
    "#06b6d4", // cyan
    "#84cc16", // lime
    "#f97316", // orange
    "#14b8a6", // teal
    "#a855f7", // purple
    "#22c55e", // green
    "#eab308", // yellow
    "#3b82f6", // blue
    "#f43f5e", // rose
    "#64748b", // slate
];

pub fn track_color(index: usize) -> &'static str {
    TRACK_COLORS[index % TRACK_COLORS.len()]
}

pub fn track_id(job_id: &str, stem_name: &str) -> String {
    format!("{}_{}", job_id, stem_name)
}

/// Build editor tracks from a status payload's stems, in payload order,
/// with default mix parameters.
pub fn materialize_tracks(job_id: &str, stems: &IndexMap<String, StemInfo>) -> Vec<AudioTrack> {
    stems
        .iter()
        .enumerate()
        .map(|(index, (stem_name, info))| AudioTrack {
            id: track_id(job_id, stem_name),
            name: stem_name.clone(),
            url: info.url.clone(),
            duration: info.duration,
            volume: DEFAULT_TRACK_VOLUME,
            pan: 0.0,
            muted: false,
            solo: false,
            color: track_color(index).to_string(),
            waveform_data: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn stems(names: &[&str]) -> IndexMap<String, StemInfo> {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    StemInfo {
                        filename: format!("{}.wav", n),
                        url: format!("/files/{}.wav", n),
                        duration: 42.0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_one_track_per_stem_with_unique_ids() {
        let names: Vec<String> = (0..20).map(|i| format!("stem{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let tracks = materialize_tracks("job9", &stems(&refs));

        assert_eq!(tracks.len(), 20);
        let ids: HashSet<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 20);
        for (i, t) in tracks.iter().enumerate() {
            assert_eq!(t.id, format!("job9_stem{}", i));
            assert_eq!(t.color, TRACK_COLORS[i % 16]);
        }
        // palette wraps after 16 entries
        assert_eq!(tracks[16].color, tracks[0].color);
    }

    #[test]
    fn test_defaults_and_order() {
        let tracks = materialize_tracks("j", &stems(&["vocals", "drums"]));
        assert_eq!(tracks[0].name, "vocals");
        assert_eq!(tracks[1].name, "drums");
        assert_ne!(tracks[0].color, tracks[1].color);
        for t in &tracks {
            assert_eq!(t.volume, 0.8);
            assert_eq!(t.pan, 0.0);
            assert!(!t.muted);
            assert!(!t.solo);
            assert_eq!(t.duration, 42.0);
        }
    }

    #[test]
    fn test_idempotent() {
        let s = stems(&["bass", "other", "piano"]);
        assert_eq!(materialize_tracks("j", &s), materialize_tracks("j", &s));
    }

    #[test]
    fn test_empty_stems() {
        assert!(materialize_tracks("j", &IndexMap::new()).is_empty());
    }
}
