//! Attachment metadata and the index-stable sequence used in multi-file mode.

/// Metadata of one stored attachment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// Provider key of the stored object.
    pub key: String,

    /// Bucket the object lives in; `None` means the provider default.
    pub bucket: Option<String>,

    pub size: Option<u64>,
    pub mime_type: Option<String>,

    /// Name the file was submitted with.
    pub filename: Option<String>,

    /// Resolved retrieval path. Only ever set on a read projection.
    pub path: Option<String>,

    /// Set once the remote object has been deleted. The slot keeps its key.
    pub removed: bool,
}

impl FileEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// The bucket to address this entry in, falling back to the provider default.
    pub fn bucket_or<'a>(&'a self, default_bucket: &'a str) -> &'a str {
        self.bucket.as_deref().unwrap_or(default_bucket)
    }
}

/// Ordered attachment slots addressed by position.
///
/// A position, once assigned, identifies the same slot for the life of the
/// record: slots can be appended or marked removed, never taken out or
/// reordered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileSlots(Vec<FileEntry>);

impl FileSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.0.get(index)
    }

    /// Mutable access to a slot's fields. The slot itself cannot move.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut FileEntry> {
        self.0.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.0.iter()
    }

    /// Slots that still reference a live remote object, with their positions.
    pub fn active(&self) -> impl Iterator<Item = (usize, &FileEntry)> {
        self.0.iter().enumerate().filter(|(_, entry)| !entry.removed)
    }

    /// Append a slot and return its position.
    pub fn push(&mut self, entry: FileEntry) -> usize {
        self.0.push(entry);
        self.0.len() - 1
    }

    /// Null the path of the slot at `index` and flag it removed, keeping its
    /// key and bucket. Returns false when the index is out of range.
    pub fn mark_removed(&mut self, index: usize) -> bool {
        match self.0.get_mut(index) {
            Some(entry) => {
                entry.path = None;
                entry.removed = true;
                true
            }
            None => false,
        }
    }
}

impl FromIterator<FileEntry> for FileSlots {
    fn from_iter<T: IntoIterator<Item = FileEntry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FileSlots {
    type Item = &'a FileEntry;
    type IntoIter = std::slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_keeps_positions() {
        let mut slots: FileSlots = ["a", "b", "c"].into_iter().map(FileEntry::new).collect();
        slots.get_mut(1).unwrap().path = Some("/b".into());

        assert!(slots.mark_removed(1));
        assert_eq!(slots.len(), 3);
        assert_eq!(slots.get(1).unwrap().key, "b");
        assert_eq!(slots.get(1).unwrap().path, None);
        assert_eq!(slots.get(2).unwrap().key, "c");

        let active: Vec<usize> = slots.active().map(|(i, _)| i).collect();
        assert_eq!(active, vec![0, 2]);
        assert_eq!(slots.push(FileEntry::new("d")), 3);
    }

    #[test]
    fn out_of_range_removal_is_reported() {
        let mut slots = FileSlots::new();
        assert!(!slots.mark_removed(0));
    }

    #[test]
    fn bucket_falls_back_to_default() {
        let mut entry = FileEntry::new("k");
        assert_eq!(entry.bucket_or("public"), "public");
        entry.bucket = Some("private".into());
        assert_eq!(entry.bucket_or("public"), "private");
    }
}
