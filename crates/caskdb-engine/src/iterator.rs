//! A cursor over live keys, honoring prefix filtering and direction (§4.5,
//! §6). Thin wrapper over the keydir's own ordered cursor; only value
//! lookups need to go back through the engine's segments.

use caskdb_storage::KeydirIterator;

use crate::db::Engine;
use crate::error::Result;
use crate::options::IteratorOptions;

pub struct KeyIterator<'a> {
    engine: &'a Engine,
    cursor: Box<dyn KeydirIterator>,
    prefix: Vec<u8>,
}

impl<'a> KeyIterator<'a> {
    pub(crate) fn new(engine: &'a Engine, options: IteratorOptions) -> Self {
        let cursor = engine.index.iter(options.reverse);
        let mut iter = Self {
            engine,
            cursor,
            prefix: options.prefix,
        };
        iter.rewind();
        iter
    }

    pub fn rewind(&mut self) {
        self.cursor.rewind();
        self.skip_until_prefix_matches();
    }

    pub fn seek(&mut self, key: &[u8]) {
        self.cursor.seek(key);
        self.skip_until_prefix_matches();
    }

    pub fn next(&mut self) {
        self.cursor.next();
        self.skip_until_prefix_matches();
    }

    pub fn valid(&self) -> bool {
        self.cursor.valid()
    }

    pub fn key(&self) -> &[u8] {
        self.cursor.key()
    }

    pub fn value(&self) -> Result<Vec<u8>> {
        self.engine.read_value_at(self.cursor.value())
    }

    pub fn close(&mut self) {
        self.cursor.close();
    }

    fn skip_until_prefix_matches(&mut self) {
        if self.prefix.is_empty() {
            return;
        }
        while self.cursor.valid() && !self.cursor.key().starts_with(self.prefix.as_slice()) {
            self.cursor.next();
        }
    }
}

impl Drop for KeyIterator<'_> {
    fn drop(&mut self) {
        self.cursor.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Engine;
    use crate::options::Options;

    fn options_in(dir: &std::path::Path) -> Options {
        Options {
            dir_path: dir.to_path_buf(),
            data_file_size: 4096,
            ..Options::default()
        }
    }

    #[test]
    fn iterates_keys_in_order_with_values() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(options_in(dir.path())).unwrap();
        for (key, value) in [("b", "2"), ("a", "1"), ("c", "3")] {
            engine.put(key.as_bytes(), value.as_bytes()).unwrap();
        }

        let mut iter = engine.new_iterator(IteratorOptions::default());
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push((iter.key().to_vec(), iter.value().unwrap()));
            iter.next();
        }
        assert_eq!(
            seen,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]
        );
    }

    #[test]
    fn prefix_filters_out_non_matching_keys() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(options_in(dir.path())).unwrap();
        for key in ["app:1", "app:2", "zzz"] {
            engine.put(key.as_bytes(), b"v").unwrap();
        }

        let mut iter = engine.new_iterator(IteratorOptions {
            prefix: b"app:".to_vec(),
            reverse: false,
        });
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(seen, vec![b"app:1".to_vec(), b"app:2".to_vec()]);
    }

    #[test]
    fn reverse_iterates_in_descending_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(options_in(dir.path())).unwrap();
        for key in ["a", "b", "c"] {
            engine.put(key.as_bytes(), b"v").unwrap();
        }

        let mut iter = engine.new_iterator(IteratorOptions {
            prefix: Vec::new(),
            reverse: true,
        });
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(seen, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }
}
