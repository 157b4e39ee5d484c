use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("attachment index {index} out of range ({len} attached)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Process-local, revocable reference to a pending upload, used only for
/// local display. Never sent to the server.
///
/// Release is irreversible; releasing an already-released handle is a
/// no-op.
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    id: String,
    released: Arc<AtomicBool>,
}

impl PreviewHandle {
    fn mint() -> Self {
        Self {
            id: format!("preview://{}", Uuid::new_v4()),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Returns `true` only for the call that actually released the handle.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }
}

/// A locally selected file pending upload, paired with its preview handle.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub preview: PreviewHandle,
}

/// Owns every attachment selected for the current submission. Attachment
/// order is upload order, which is the order the generation service
/// receives the files.
#[derive(Debug, Default)]
pub struct AttachmentManager {
    attachments: Vec<Attachment>,
}

impl AttachmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends each file after the existing entries, minting a fresh
    /// preview handle per file. Returns the minted handles in order.
    pub fn add<I>(&mut self, files: I) -> Vec<PreviewHandle>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut minted = Vec::new();
        for (file_name, bytes) in files {
            let preview = PreviewHandle::mint();
            minted.push(preview.clone());
            self.attachments.push(Attachment {
                file_name,
                bytes,
                preview,
            });
        }
        minted
    }

    /// Releases the preview handle at `index`, then removes the entry.
    pub fn remove_at(&mut self, index: usize) -> Result<(), AttachmentError> {
        if index >= self.attachments.len() {
            return Err(AttachmentError::IndexOutOfRange {
                index,
                len: self.attachments.len(),
            });
        }
        self.attachments[index].preview.release();
        self.attachments.remove(index);
        Ok(())
    }

    /// Releases every preview handle and empties the set. Safe to call
    /// when already empty.
    pub fn clear(&mut self) {
        for attachment in &self.attachments {
            attachment.preview.release();
        }
        self.attachments.clear();
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }
}

impl Drop for AttachmentManager {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{AttachmentError, AttachmentManager};

    fn file(name: &str, payload: &[u8]) -> (String, Vec<u8>) {
        (name.to_string(), payload.to_vec())
    }

    #[test]
    fn add_preserves_upload_order() {
        let mut manager = AttachmentManager::new();
        manager.add([file("kitchen.jpg", b"k"), file("balcony.jpg", b"b")]);
        manager.add([file("front.jpg", b"f")]);

        let names: Vec<&str> = manager
            .attachments()
            .iter()
            .map(|attachment| attachment.file_name.as_str())
            .collect();
        assert_eq!(names, ["kitchen.jpg", "balcony.jpg", "front.jpg"]);
    }

    #[test]
    fn remove_at_releases_only_the_removed_handle() {
        let mut manager = AttachmentManager::new();
        let handles = manager.add([file("one.jpg", b"1"), file("two.jpg", b"2")]);

        manager.remove_at(0).unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.attachments()[0].file_name, "two.jpg");
        assert!(handles[0].is_released());
        assert!(!handles[1].is_released());
    }

    #[test]
    fn remove_at_rejects_out_of_range_index() {
        let mut manager = AttachmentManager::new();
        manager.add([file("one.jpg", b"1")]);

        assert_eq!(
            manager.remove_at(1),
            Err(AttachmentError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn clear_releases_every_handle_exactly_once() {
        let mut manager = AttachmentManager::new();
        let handles = manager.add([
            file("a.jpg", b"a"),
            file("b.jpg", b"b"),
            file("c.jpg", b"c"),
        ]);

        manager.clear();
        assert!(manager.is_empty());
        assert!(handles.iter().all(|handle| handle.is_released()));

        // already released; a second pass must not release again
        assert!(handles.iter().all(|handle| !handle.release()));
        manager.clear();
    }

    #[test]
    fn double_release_is_a_noop() {
        let mut manager = AttachmentManager::new();
        let handles = manager.add([file("a.jpg", b"a")]);

        assert!(handles[0].release());
        assert!(!handles[0].release());
        assert!(handles[0].is_released());
    }

    #[test]
    fn drop_releases_outstanding_handles() {
        let mut manager = AttachmentManager::new();
        let handles = manager.add([file("a.jpg", b"a")]);
        drop(manager);
        assert!(handles[0].is_released());
    }
}
