use super::table::KindMap;
use super::ObjectKind;
use crate::error::{Result, TraceError};
use fnv::FnvHashMap;
use std::sync::{Mutex, MutexGuard};

type ScopedMap = FnvHashMap<(ObjectKind, u32, i32), i32>;

/// Handle tables guarded by one lock per object kind
///
/// For replaying several capture threads in parallel. `resolve_or_create` holds the
/// kind's lock across check, create and insert, so two threads binding the same
/// unseen id create exactly one object. Program-scoped locations share a single
/// lock, taken after the program kind's lock when a program is released.
#[derive(Debug)]
pub struct ConcurrentHandleTables {
    kinds: Vec<Mutex<KindMap>>,
    scoped: Mutex<ScopedMap>,
}

impl Default for ConcurrentHandleTables {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrentHandleTables {
    pub fn new() -> Self {
        Self {
            kinds: ObjectKind::ALL
                .iter()
                .map(|_| Mutex::new(KindMap::default()))
                .collect(),
            scoped: Mutex::new(ScopedMap::default()),
        }
    }

    fn lock(&self, kind: ObjectKind) -> MutexGuard<'_, KindMap> {
        // A panic while holding the lock leaves the map itself consistent.
        self.kinds[kind.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_scoped(&self) -> MutexGuard<'_, ScopedMap> {
        self.scoped
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn resolve(&self, kind: ObjectKind, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        self.lock(kind)
            .forward
            .get(&id)
            .copied()
            .ok_or(TraceError::UnknownHandle { kind, id })
    }

    pub fn resolve_or_create<F>(&self, kind: ObjectKind, id: u32, create: F) -> (u32, bool)
    where
        F: FnOnce() -> u32,
    {
        if id == 0 {
            return (0, false);
        }
        let mut map = self.lock(kind);
        if let Some(&new) = map.forward.get(&id) {
            return (new, false);
        }
        let new = create();
        map.insert(kind, id, new);
        (new, true)
    }

    pub fn register(&self, kind: ObjectKind, old: u32, new: u32) {
        if old != 0 {
            self.lock(kind).insert(kind, old, new);
        }
    }

    pub fn release(&self, kind: ObjectKind, old: u32) -> Option<u32> {
        if old == 0 {
            return None;
        }
        let mut map = self.lock(kind);
        if kind == ObjectKind::Program {
            self.lock_scoped().retain(|&(_, program, _), _| program != old);
        }
        map.remove(old)
    }

    pub fn reverse(&self, kind: ObjectKind, new: u32) -> Option<u32> {
        if new == 0 {
            return Some(0);
        }
        self.lock(kind).reverse.get(&new).copied()
    }

    pub fn resolve_scoped(&self, kind: ObjectKind, program: u32, old: i32) -> Result<i32> {
        if old == -1 {
            return Ok(-1);
        }
        self.lock_scoped()
            .get(&(kind, program, old))
            .copied()
            .ok_or(TraceError::UnknownHandle {
                kind,
                id: old as u32,
            })
    }

    pub fn register_scoped(&self, kind: ObjectKind, program: u32, old: i32, new: i32) {
        if old != -1 {
            self.lock_scoped().insert((kind, program, old), new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_racing_binds_create_once() {
        let tables = Arc::new(ConcurrentHandleTables::new());
        let created = Arc::new(AtomicU32::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let tables = Arc::clone(&tables);
                let created = Arc::clone(&created);
                thread::spawn(move || {
                    tables
                        .resolve_or_create(ObjectKind::Texture, 42, || {
                            created.fetch_add(1, Ordering::SeqCst) + 500
                        })
                        .0
                })
            })
            .collect();

        let ids: Vec<u32> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|&id| id == 500));
    }

    #[test]
    fn test_release_then_resolve_fails() {
        let tables = ConcurrentHandleTables::new();
        tables.register(ObjectKind::Buffer, 3, 30);
        assert_eq!(tables.reverse(ObjectKind::Buffer, 30), Some(3));
        assert_eq!(tables.release(ObjectKind::Buffer, 3), Some(30));
        assert!(tables.resolve(ObjectKind::Buffer, 3).is_err());
        assert_eq!(tables.resolve(ObjectKind::Buffer, 0).unwrap(), 0);
    }

    #[test]
    fn test_program_release_drops_its_locations() {
        let tables = ConcurrentHandleTables::new();
        tables.register(ObjectKind::Program, 1, 10);
        tables.register_scoped(ObjectKind::UniformLocation, 1, 3, 7);
        tables.register_scoped(ObjectKind::UniformBlock, 1, 0, 2);
        tables.register_scoped(ObjectKind::UniformLocation, 2, 3, 9);
        tables.register_scoped(ObjectKind::UniformLocation, 1, -1, 5);
        assert_eq!(tables.resolve_scoped(ObjectKind::UniformLocation, 1, 3).unwrap(), 7);
        assert_eq!(tables.resolve_scoped(ObjectKind::UniformLocation, 1, -1).unwrap(), -1);

        assert_eq!(tables.release(ObjectKind::Program, 1), Some(10));
        assert!(tables.resolve_scoped(ObjectKind::UniformLocation, 1, 3).is_err());
        assert!(tables.resolve_scoped(ObjectKind::UniformBlock, 1, 0).is_err());
        assert_eq!(tables.resolve_scoped(ObjectKind::UniformLocation, 2, 3).unwrap(), 9);
    }
}
