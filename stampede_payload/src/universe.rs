//! A persisted name universe, as read back by the replay side.

use std::path::Path;

use rand::{Rng, seq::IndexedRandom};

use crate::snapshot;

/// Errors produced by [`Universe::load`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The snapshot could not be read.
    #[error(transparent)]
    Snapshot(#[from] snapshot::Error),
    /// The snapshot holds no names, there is nothing to replay.
    #[error("name universe holds no names")]
    Empty,
}

/// The set of metric names produced by a generation run.
///
/// The universe is immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    names: Vec<String>,
}

impl Universe {
    /// Construct a [`Universe`] from already rendered names.
    ///
    /// # Errors
    ///
    /// Returns an error if `names` is empty.
    pub fn new(names: Vec<String>) -> Result<Self, Error> {
        if names.is_empty() {
            return Err(Error::Empty);
        }
        Ok(Self { names })
    }

    /// Load the universe persisted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a JSON list of
    /// strings or is empty.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let names: Vec<String> = snapshot::load(path)?;
        Self::new(names)
    }

    /// Draw one name uniformly at random. Repeats across calls are expected.
    pub fn choose<R>(&self, rng: &mut R) -> &str
    where
        R: Rng + ?Sized,
    {
        // `names` is never empty, see the constructor.
        self.names.choose(rng).map_or("", String::as_str)
    }

    /// The number of names in the universe.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false, a [`Universe`] cannot be constructed empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The names, in persisted order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod test {
    use rand::{SeedableRng, rngs::SmallRng};

    use super::{Error, Universe};
    use crate::snapshot;

    #[test]
    fn empty_universe_is_rejected() {
        assert!(matches!(Universe::new(Vec::new()), Err(Error::Empty)));

        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("metrics.json");
        snapshot::save::<[String]>(&[], &path).expect("snapshot written");
        assert!(matches!(Universe::load(&path), Err(Error::Empty)));
    }

    #[test]
    fn choose_draws_members() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let universe = Universe::new(names.clone()).expect("non-empty");
        let mut rng = SmallRng::seed_from_u64(42);

        let mut seen = [false; 3];
        for _ in 0..256 {
            let name = universe.choose(&mut rng);
            let position = names
                .iter()
                .position(|n| n == name)
                .expect("drawn name is a member");
            seen[position] = true;
        }
        assert_eq!(seen, [true, true, true]);
    }

    #[test]
    fn loads_snapshot_in_order() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("metrics.json");
        snapshot::save(&["z", "a"], &path).expect("snapshot written");

        let universe = Universe::load(&path).expect("snapshot loads");
        assert_eq!(universe.names(), ["z".to_string(), "a".to_string()]);
        assert_eq!(universe.len(), 2);
    }
}
