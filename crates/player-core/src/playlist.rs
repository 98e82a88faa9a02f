//! Playlist state: the ordered entries and the index of the current one.
//!
//! All index bookkeeping lives here so that the "current" pointer keeps
//! following the same logical entry through append, remove and reorder.
//! Out-of-range indices (stale UI events) are no-ops.

use std::path::Path;

use player_proto::protocol::{EntryId, Locator, MediaEntry, SubtitleTrack};
use tracing::debug;

/// What happened to the current entry as a result of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentChange {
    /// Same entry at the same index (or nothing selected).
    Unchanged,
    /// Same entry, new index.
    Moved { from: usize, to: usize },
    /// The current entry was removed; this is the new current index.
    Replaced(Option<usize>),
}

#[derive(Debug)]
pub struct Removed {
    pub entry: MediaEntry,
    pub change: CurrentChange,
}

#[derive(Debug, Default)]
pub struct Playlist {
    entries: Vec<MediaEntry>,
    current: Option<usize>,
    next_id: u64,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MediaEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&MediaEntry> {
        self.entries.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_entry(&self) -> Option<&MediaEntry> {
        self.current.and_then(|i| self.entries.get(i))
    }

    /// Build an entry for a local file with a fresh id.  The entry is not
    /// added until passed to `append`.
    pub fn new_local_entry(&mut self, display_name: String, locator: Locator, mime_kind: String) -> MediaEntry {
        self.next_id += 1;
        MediaEntry {
            id: EntryId(self.next_id),
            display_name,
            locator,
            mime_kind,
            is_live_stream: false,
            subtitle_tracks: Vec::new(),
        }
    }

    /// Add entries at the end.  When `select_if_idle` is set and no entry is
    /// current, the first new entry becomes current and its index is returned.
    pub fn append(&mut self, entries: Vec<MediaEntry>, select_if_idle: bool) -> Option<usize> {
        let first_new = self.entries.len();
        let added = entries.len();
        self.entries.extend(entries);
        debug!("playlist: appended {} entries (len {})", added, self.entries.len());

        if added > 0 && select_if_idle && self.current.is_none() {
            self.current = Some(first_new);
            return Some(first_new);
        }
        None
    }

    /// Make `index` current.  Returns the entry, or `None` for a stale index.
    pub fn select(&mut self, index: usize) -> Option<&MediaEntry> {
        let entry = self.entries.get(index)?;
        self.current = Some(index);
        Some(entry)
    }

    /// Forget the current entry (a station was tuned instead).
    pub fn clear_selection(&mut self) {
        self.current = None;
    }

    pub fn remove(&mut self, index: usize) -> Option<Removed> {
        if index >= self.entries.len() {
            return None;
        }
        let entry = self.entries.remove(index);

        let change = match self.current {
            None => CurrentChange::Unchanged,
            Some(cur) if cur == index => {
                let next = if self.entries.is_empty() {
                    None
                } else {
                    Some(index.min(self.entries.len() - 1))
                };
                self.current = next;
                CurrentChange::Replaced(next)
            }
            Some(cur) if index < cur => {
                self.current = Some(cur - 1);
                CurrentChange::Moved {
                    from: cur,
                    to: cur - 1,
                }
            }
            Some(_) => CurrentChange::Unchanged,
        };

        debug!("playlist: removed '{}' at {} → {:?}", entry.display_name, index, change);
        Some(Removed { entry, change })
    }

    /// Move the entry at `from` so it ends up at `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> CurrentChange {
        let len = self.entries.len();
        if from == to || from >= len || to >= len {
            return CurrentChange::Unchanged;
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);

        let Some(cur) = self.current else {
            return CurrentChange::Unchanged;
        };
        let moved = if cur == from {
            to
        } else if from < cur && to >= cur {
            cur - 1
        } else if from > cur && to <= cur {
            cur + 1
        } else {
            cur
        };
        self.current = Some(moved);

        if moved == cur {
            CurrentChange::Unchanged
        } else {
            CurrentChange::Moved { from: cur, to: moved }
        }
    }

    /// Attach subtitle tracks to the current entry.  Returns the index of the
    /// first added track, or `None` when nothing is current.
    pub fn add_subtitles(&mut self, tracks: Vec<SubtitleTrack>) -> Option<usize> {
        let cur = self.current?;
        let entry = self.entries.get_mut(cur)?;
        let first_new = entry.subtitle_tracks.len();
        entry.subtitle_tracks.extend(tracks);
        Some(first_new)
    }

    /// Index after the current one; no wraparound.
    pub fn next_index(&self) -> Option<usize> {
        let cur = self.current?;
        (cur + 1 < self.entries.len()).then_some(cur + 1)
    }

    /// Index before the current one; no wraparound.
    pub fn previous_index(&self) -> Option<usize> {
        self.current?.checked_sub(1)
    }

    /// Take every entry out, leaving an empty playlist.  Used on teardown.
    pub fn drain(&mut self) -> Vec<MediaEntry> {
        self.current = None;
        std::mem::take(&mut self.entries)
    }
}

/// Best-effort MIME type from a file extension.  Empty when unknown.
pub fn mime_kind_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let kind = match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "ogv" => "video/ogg",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/mp4",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "ogg" | "oga" | "opus" => "audio/ogg",
        _ => "",
    };
    kind.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_proto::protocol::BlobHandle;

    fn playlist_of(n: usize) -> Playlist {
        let mut p = Playlist::new();
        let entries = (0..n)
            .map(|i| {
                p.new_local_entry(
                    format!("{}.mp4", i),
                    Locator::Blob(BlobHandle(i as u64)),
                    "video/mp4".into(),
                )
            })
            .collect();
        p.append(entries, false);
        p
    }

    fn names(p: &Playlist) -> Vec<String> {
        p.entries().iter().map(|e| e.display_name.clone()).collect()
    }

    fn current_name(p: &Playlist) -> Option<String> {
        p.current_entry().map(|e| e.display_name.clone())
    }

    #[test]
    fn test_append_selects_first_new_when_idle() {
        let mut p = playlist_of(2);
        let more = vec![p.new_local_entry("x".into(), Locator::Blob(BlobHandle(9)), String::new())];
        assert_eq!(p.append(more, true), Some(2));
        assert_eq!(p.current_index(), Some(2));

        let again = vec![p.new_local_entry("y".into(), Locator::Blob(BlobHandle(10)), String::new())];
        assert_eq!(p.append(again, true), None);
        assert_eq!(p.current_index(), Some(2));
    }

    #[test]
    fn test_append_while_station_tuned_does_not_select() {
        let mut p = Playlist::new();
        let e = vec![p.new_local_entry("a".into(), Locator::Blob(BlobHandle(1)), String::new())];
        assert_eq!(p.append(e, false), None);
        assert_eq!(p.current_index(), None);
    }

    #[test]
    fn test_append_empty_batch_selects_nothing() {
        let mut p = Playlist::new();
        assert_eq!(p.append(Vec::new(), true), None);
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let p = playlist_of(3);
        let ids: Vec<_> = p.entries().iter().map(|e| e.id).collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }

    #[test]
    fn test_remove_only_entry() {
        let mut p = playlist_of(1);
        p.select(0);
        let removed = p.remove(0).unwrap();
        assert_eq!(removed.change, CurrentChange::Replaced(None));
        assert!(p.is_empty());
        assert_eq!(p.current_index(), None);
    }

    #[test]
    fn test_remove_current_selects_min_i_n_minus_2() {
        for n in 2..6 {
            for i in 0..n {
                let mut p = playlist_of(n);
                p.select(i);
                let removed = p.remove(i).unwrap();
                let expected = i.min(n - 2);
                assert_eq!(removed.change, CurrentChange::Replaced(Some(expected)));
                assert_eq!(p.current_index(), Some(expected), "n={} i={}", n, i);
            }
        }
    }

    #[test]
    fn test_remove_before_current_tracks_entry() {
        let mut p = playlist_of(4);
        p.select(2);
        let removed = p.remove(0).unwrap();
        assert_eq!(removed.change, CurrentChange::Moved { from: 2, to: 1 });
        assert_eq!(current_name(&p).as_deref(), Some("2.mp4"));
    }

    #[test]
    fn test_remove_after_current_is_unchanged() {
        let mut p = playlist_of(4);
        p.select(1);
        assert_eq!(p.remove(3).unwrap().change, CurrentChange::Unchanged);
        assert_eq!(p.current_index(), Some(1));
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let mut p = playlist_of(2);
        p.select(1);
        assert!(p.remove(2).is_none());
        assert_eq!(p.len(), 2);
        assert_eq!(p.current_index(), Some(1));
    }

    #[test]
    fn test_select_out_of_range_is_noop() {
        let mut p = playlist_of(2);
        p.select(0);
        assert!(p.select(5).is_none());
        assert_eq!(p.current_index(), Some(0));
    }

    #[test]
    fn test_reorder_current_moves_to_target() {
        let mut p = playlist_of(5);
        p.select(1);
        assert_eq!(p.reorder(1, 4), CurrentChange::Moved { from: 1, to: 4 });
        assert_eq!(names(&p), vec!["0.mp4", "2.mp4", "3.mp4", "4.mp4", "1.mp4"]);
        assert_eq!(current_name(&p).as_deref(), Some("1.mp4"));
    }

    #[test]
    fn test_reorder_crossing_from_below_shifts_down() {
        let mut p = playlist_of(5);
        p.select(2);
        assert_eq!(p.reorder(0, 2), CurrentChange::Moved { from: 2, to: 1 });
        assert_eq!(current_name(&p).as_deref(), Some("2.mp4"));
        assert_eq!(p.reorder(0, 4), CurrentChange::Moved { from: 1, to: 0 });
        assert_eq!(current_name(&p).as_deref(), Some("2.mp4"));
    }

    #[test]
    fn test_reorder_crossing_from_above_shifts_up() {
        let mut p = playlist_of(5);
        p.select(2);
        assert_eq!(p.reorder(4, 2), CurrentChange::Moved { from: 2, to: 3 });
        assert_eq!(current_name(&p).as_deref(), Some("2.mp4"));
        assert_eq!(p.reorder(4, 0), CurrentChange::Moved { from: 3, to: 4 });
        assert_eq!(current_name(&p).as_deref(), Some("2.mp4"));
    }

    #[test]
    fn test_reorder_not_crossing_is_unchanged() {
        let mut p = playlist_of(5);
        p.select(0);
        assert_eq!(p.reorder(3, 1), CurrentChange::Unchanged);
        assert_eq!(p.reorder(2, 2), CurrentChange::Unchanged);
        assert_eq!(p.reorder(9, 0), CurrentChange::Unchanged);
        assert_eq!(current_name(&p).as_deref(), Some("0.mp4"));
    }

    #[test]
    fn test_current_follows_entry_through_mixed_sequence() {
        let mut p = playlist_of(6);
        p.select(3);
        let id = p.current_entry().unwrap().id;

        p.reorder(5, 0);
        p.remove(1);
        p.reorder(p.current_index().unwrap(), 0);
        p.remove(4);
        let more = vec![p.new_local_entry("late".into(), Locator::Blob(BlobHandle(99)), String::new())];
        p.append(more, true);
        p.reorder(p.len() - 1, 0);

        assert_eq!(p.current_entry().unwrap().id, id);
    }

    #[test]
    fn test_next_and_previous_are_clamped() {
        let mut p = playlist_of(3);
        assert_eq!(p.next_index(), None);
        p.select(0);
        assert_eq!(p.previous_index(), None);
        assert_eq!(p.next_index(), Some(1));
        p.select(2);
        assert_eq!(p.next_index(), None);
        assert_eq!(p.previous_index(), Some(1));
    }

    #[test]
    fn test_add_subtitles_needs_current_entry() {
        let mut p = playlist_of(2);
        let track = SubtitleTrack {
            locator: Locator::Blob(BlobHandle(50)),
            label: "en.srt".into(),
        };
        assert_eq!(p.add_subtitles(vec![track.clone()]), None);
        p.select(1);
        assert_eq!(p.add_subtitles(vec![track.clone()]), Some(0));
        assert_eq!(p.add_subtitles(vec![track]), Some(1));
        assert_eq!(p.current_entry().unwrap().subtitle_tracks.len(), 2);
    }

    #[test]
    fn test_mime_kind_for_path() {
        assert_eq!(mime_kind_for_path(Path::new("/a/B.MKV")), "video/x-matroska");
        assert_eq!(mime_kind_for_path(Path::new("song.flac")), "audio/flac");
        assert_eq!(mime_kind_for_path(Path::new("README")), "");
    }
}
