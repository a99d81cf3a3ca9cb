//! In-memory command history.

use crate::error::{Error, ErrorKind};

/// One history entry.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    /// The 1-based entry number. Numbers are stable across deletions.
    pub number: usize,
    /// The command text.
    pub command: String,
    /// When the entry was recorded.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// The session's command history.
#[derive(Clone, Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    next_number: usize,
}

impl History {
    /// Returns an empty history.
    pub fn new() -> Self {
        Self {
            entries: vec![],
            next_number: 1,
        }
    }

    /// Appends a command.
    pub fn add(&mut self, command: String) {
        if self.next_number == 0 {
            self.next_number = 1;
        }

        let number = self.next_number;
        self.next_number += 1;

        self.entries.push(HistoryEntry {
            number,
            command,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Returns the most recent entry.
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Returns the entry with the given number.
    pub fn get_by_number(&self, number: usize) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.number == number)
    }

    /// Deletes the entry at the given offset. Positive offsets are entry
    /// numbers; negative offsets count back from the end (-1 = most recent).
    pub fn delete_at_offset(&mut self, offset: i64) -> Result<(), Error> {
        let index = if offset < 0 {
            let back = offset
                .unsigned_abs()
                .try_into()
                .map_err(|_| Error::from(ErrorKind::HistoryItemNotFound))?;
            self.entries
                .len()
                .checked_sub(back)
                .ok_or(ErrorKind::HistoryItemNotFound)?
        } else {
            let number = usize::try_from(offset).map_err(|_| ErrorKind::HistoryItemNotFound)?;
            self.entries
                .iter()
                .position(|e| e.number == number)
                .ok_or(ErrorKind::HistoryItemNotFound)?
        };

        self.entries.remove(index);
        Ok(())
    }

    /// Serialises the history in history-file format; with timestamps, each
    /// entry is preceded by a `: SECONDS:0;` marker line.
    pub fn serialize(&self, with_timestamps: bool) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            if with_timestamps {
                result.push_str(&format!(": {}:0;", entry.timestamp.timestamp()));
            }
            result.push_str(entry.command.as_str());
            result.push('\n');
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn history_of(commands: &[&str]) -> History {
        let mut history = History::new();
        for command in commands {
            history.add((*command).to_owned());
        }
        history
    }

    #[test]
    fn numbering_is_stable_across_deletion() {
        let mut history = history_of(&["one", "two", "three"]);

        history.delete_at_offset(2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.get_by_number(3).unwrap().command, "three");
        assert!(history.get_by_number(2).is_none());

        // New entries continue from the high-water mark.
        history.add("four".into());
        assert_eq!(history.last().unwrap().number, 4);
    }

    #[test]
    fn negative_offsets_count_from_end() {
        let mut history = history_of(&["one", "two", "three"]);
        history.delete_at_offset(-1).unwrap();
        assert_eq!(history.last().unwrap().command, "two");

        assert!(history.delete_at_offset(-10).is_err());
    }

    #[test]
    fn serialization_format() {
        let history = history_of(&["echo hi"]);

        assert_eq!(history.serialize(false), "echo hi\n");

        let timestamped = history.serialize(true);
        assert!(timestamped.starts_with(": "));
        assert!(timestamped.ends_with(":0;echo hi\n"));
    }
}
