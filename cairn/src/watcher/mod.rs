use crate::error::Result;
use crate::store::{ASSETS_DIR, GLOBALS_DIR};
use crate::util::is_safe_name;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const DEBOUNCE: Duration = Duration::from_millis(100);

/// What a change on disk refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentTarget {
    Entry { collection: String, id: String },
    Global { name: String },
    Asset { filename: String },
}

/// The kind of file change detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEvent {
    pub target: ContentTarget,
    pub kind: ChangeKind,
}

/// Watches a content directory and reports changes to entries, global values
/// and assets. Debounced events are sent through an mpsc channel.
pub struct ContentWatcher {
    _watcher: RecommendedWatcher,
    /// Handle to the background thread processing events
    _thread: std::thread::JoinHandle<()>,
    /// Receiver for debounced content change events
    pub event_rx: mpsc::Receiver<ContentEvent>,
}

impl ContentWatcher {
    /// Start watching `root` recursively. Debounced events (100ms) are available
    /// via `event_rx`.
    pub fn start(root: &Path) -> Result<Self> {
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();
        let (event_tx, event_rx) = mpsc::channel::<ContentEvent>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        // Events may arrive with the canonical form of the root
        let roots: Vec<PathBuf> = std::iter::once(root.to_path_buf())
            .chain(root.canonicalize().ok())
            .collect();
        log::debug!("Watching {}", root.display());

        let thread = std::thread::spawn(move || {
            let mut pending: Vec<ContentEvent> = Vec::new();
            let mut last_event = Instant::now();

            loop {
                match notify_rx.recv_timeout(DEBOUNCE) {
                    Ok(Ok(event)) => {
                        let kind = match event.kind {
                            EventKind::Create(_) => Some(ChangeKind::Created),
                            EventKind::Modify(_) => Some(ChangeKind::Modified),
                            EventKind::Remove(_) => Some(ChangeKind::Deleted),
                            _ => None,
                        };

                        if let Some(kind) = kind {
                            for path in &event.paths {
                                if let Some(target) = roots.iter().find_map(|r| classify(r, path)) {
                                    pending.push(ContentEvent { target, kind });
                                }
                            }
                        }
                        last_event = Instant::now();
                    }
                    Ok(Err(e)) => {
                        log::warn!("Content watcher error: {e}");
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if !pending.is_empty() && last_event.elapsed() >= DEBOUNCE {
                            for event in coalesce(pending.drain(..)) {
                                if event_tx.send(event).is_err() {
                                    return; // Receiver dropped
                                }
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(ContentWatcher {
            _watcher: watcher,
            _thread: thread,
            event_rx,
        })
    }
}

/// Map a changed path to the content it belongs to. Anything that isn't a
/// document or asset at the expected depth (temp files, `schema.yaml`, nested
/// directories) is `None`.
pub fn classify(root: &Path, path: &Path) -> Option<ContentTarget> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;

    let [dir, file] = parts.as_slice() else {
        return None;
    };
    if !is_safe_name(dir) || !is_safe_name(file) {
        return None;
    }

    if *dir == ASSETS_DIR {
        return Some(ContentTarget::Asset {
            filename: file.to_string(),
        });
    }

    let stem = file.strip_suffix(".json").filter(|s| is_safe_name(s))?;
    if *dir == GLOBALS_DIR {
        Some(ContentTarget::Global {
            name: stem.to_string(),
        })
    } else {
        Some(ContentTarget::Entry {
            collection: dir.to_string(),
            id: stem.to_string(),
        })
    }
}

/// Collapse repeated events for the same target, keeping the first position and
/// the last kind.
fn coalesce(events: impl IntoIterator<Item = ContentEvent>) -> Vec<ContentEvent> {
    let mut out: Vec<ContentEvent> = Vec::new();
    for event in events {
        match out.iter_mut().find(|e| e.target == event.target) {
            Some(existing) => existing.kind = event.kind,
            None => out.push(event),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(collection: &str, id: &str) -> Option<ContentTarget> {
        Some(ContentTarget::Entry {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    #[test]
    fn test_classify_content_paths() {
        let root = Path::new("/content");
        assert_eq!(classify(root, Path::new("/content/posts/hello.json")), entry("posts", "hello"));
        assert_eq!(
            classify(root, Path::new("/content/globals/settings.json")),
            Some(ContentTarget::Global { name: "settings".to_string() })
        );
        assert_eq!(
            classify(root, Path::new("/content/assets/logo.png")),
            Some(ContentTarget::Asset { filename: "logo.png".to_string() })
        );
    }

    #[test]
    fn test_classify_ignores_non_content() {
        let root = Path::new("/content");
        assert_eq!(classify(root, Path::new("/content/schema.yaml")), None);
        assert_eq!(classify(root, Path::new("/content/posts/.tmpA1b2C3")), None);
        assert_eq!(classify(root, Path::new("/content/posts/notes.txt")), None);
        assert_eq!(classify(root, Path::new("/content/posts/drafts/a.json")), None);
        assert_eq!(classify(root, Path::new("/content/posts")), None);
        assert_eq!(classify(root, Path::new("/elsewhere/posts/a.json")), None);
    }

    #[test]
    fn test_coalesce_keeps_last_kind() {
        let event = |id: &str, kind| ContentEvent {
            target: entry("posts", id).unwrap(),
            kind,
        };
        let events = coalesce([
            event("a", ChangeKind::Created),
            event("b", ChangeKind::Modified),
            event("a", ChangeKind::Modified),
            event("b", ChangeKind::Deleted),
        ]);
        assert_eq!(
            events,
            vec![event("a", ChangeKind::Modified), event("b", ChangeKind::Deleted)]
        );
    }

    #[test]
    fn test_watcher_reports_entry_writes() {
        use crate::store::test_support::setup_test_store;
        use serde_json::json;

        let (tmp, store) = setup_test_store();
        std::fs::create_dir_all(tmp.path().join("posts")).unwrap();
        let watcher = ContentWatcher::start(tmp.path()).unwrap();

        store.set_entry("posts", "hello", json!({ "title": "Hi" })).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            if let Ok(event) = watcher.event_rx.recv_timeout(Duration::from_millis(200)) {
                seen.push(event.target);
                if seen.contains(&entry("posts", "hello").unwrap()) {
                    break;
                }
            }
        }
        assert!(seen.contains(&entry("posts", "hello").unwrap()));
    }
}
