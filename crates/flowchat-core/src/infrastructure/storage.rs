use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use crate::domain::models::Conversation;
use crate::domain::services::decode_conversations;
use crate::domain::services::encode_conversations;
use crate::domain::services::ConversationRepository;
use crate::domain::services::STORAGE_KEY;
use crate::errors::PersistenceError;

/// Conversations kept in a single JSON file.
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> FileRepository {
        FileRepository { path: path.into() }
    }

    /// `<dir>/ai-chat-data.json`
    pub fn in_dir(dir: impl AsRef<Path>) -> FileRepository {
        FileRepository::new(dir.as_ref().join(format!("{STORAGE_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConversationRepository for FileRepository {
    fn load(&self) -> Result<Vec<Conversation>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(decode_conversations(&raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("No conversation file at {}", self.path.display());
                Ok(vec![])
            }
            Err(err) => Err(PersistenceError::Read(format!(
                "{}: {}",
                self.path.display(),
                err
            ))),
        }
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), PersistenceError> {
        let raw = encode_conversations(conversations)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write next to the target and rename so a crash never leaves half a file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, raw)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Message;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileRepository::in_dir(dir.path());
        assert!(repository.load().unwrap().is_empty());
        assert!(repository.path().ends_with("ai-chat-data.json"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileRepository::in_dir(dir.path().join("nested"));

        let mut conversation = Conversation::new();
        conversation.messages.push(Message::user("persist me"));
        repository.save(&[conversation.clone()]).unwrap();

        assert_eq!(repository.load().unwrap(), vec![conversation]);
        assert!(!repository.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileRepository::in_dir(dir.path());
        fs::write(repository.path(), "[{\"id\": ").unwrap();

        assert!(repository.load().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_path_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let repository = FileRepository::new(dir.path());
        assert!(matches!(repository.load(), Err(PersistenceError::Read(_))));
    }
}
