use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::EventKind;
use serde::{Deserialize, Serialize};

pub fn now_timestamp_ms() -> u64 {
    let now = std::time::SystemTime::now();
    now.duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Coarse kind of a raw filesystem notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsEventType {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl FsEventType {
    /// Kinds that can bring a whole directory of files into view
    pub fn may_add_directory(self) -> bool {
        matches!(self, FsEventType::Created | FsEventType::Renamed)
    }

    /// Kinds that can take a whole directory of files out of view
    pub fn may_remove_directory(self) -> bool {
        matches!(self, FsEventType::Deleted | FsEventType::Renamed)
    }
}

/// Map a notify event kind to the subset that can change a command file
pub fn classify(kind: &EventKind) -> Option<FsEventType> {
    match kind {
        EventKind::Create(CreateKind::File)
        | EventKind::Create(CreateKind::Folder)
        | EventKind::Create(CreateKind::Any) => Some(FsEventType::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FsEventType::Renamed),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => Some(FsEventType::Modified),
        EventKind::Remove(RemoveKind::File)
        | EventKind::Remove(RemoveKind::Folder)
        | EventKind::Remove(RemoveKind::Any) => Some(FsEventType::Deleted),
        // Access and metadata-only changes never alter contents
        _ => None,
    }
}
