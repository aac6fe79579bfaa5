//! Hash array mapped trie with structural sharing.
//!
//! Cloning a map is O(1); `insert` and `remove` copy only the path from the
//! root to the touched leaf, so every earlier version stays valid and shares
//! the rest of its nodes with the new one.

use std::{
    borrow::Borrow,
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

const BITS_PER_LEVEL: u32 = 5;
const LEVEL_MASK: u64 = (1 << BITS_PER_LEVEL) - 1;

enum TrieNode<K, V> {
    Branch {
        bitmap: u32,
        children: Vec<Arc<TrieNode<K, V>>>,
    },
    /// Entries sharing one full 64 bit hash.
    Leaf { hash: u64, entries: Vec<(K, V)> },
}

pub struct PersistentMap<K, V> {
    root: Option<Arc<TrieNode<K, V>>>,
    len: usize,
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PersistentMap<K, V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

impl<K, V> std::fmt::Debug for PersistentMap<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

fn hash_key<Q: Hash + ?Sized>(key: &Q) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn bit_for(hash: u64, shift: u32) -> u32 {
    1 << ((hash >> shift) & LEVEL_MASK)
}

fn position(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

impl<K, V> PersistentMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            stack: self.root.iter().map(|root| root.as_ref()).collect(),
            entries: <&[(K, V)]>::default().iter(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }
}

impl<K, V> PersistentMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(key);
        let mut node = self.root.as_deref()?;
        let mut shift = 0;
        loop {
            match node {
                TrieNode::Branch { bitmap, children } => {
                    let bit = bit_for(hash, shift);
                    if bitmap & bit == 0 {
                        return None;
                    }
                    node = children[position(*bitmap, bit)].as_ref();
                    shift += BITS_PER_LEVEL;
                }
                TrieNode::Leaf {
                    hash: leaf_hash,
                    entries,
                } => {
                    if *leaf_hash != hash {
                        return None;
                    }
                    return entries
                        .iter()
                        .find(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)
                        .map(|(_, v)| v);
                }
            }
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: K, value: V) {
        let hash = hash_key(&key);
        let (root, added) = match &self.root {
            None => (
                Arc::new(TrieNode::Leaf {
                    hash,
                    entries: vec![(key, value)],
                }),
                true,
            ),
            Some(root) => insert_node(root, 0, hash, key, value),
        };
        self.root = Some(root);
        if added {
            self.len += 1;
        }
    }

    pub fn remove<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(root) = &self.root else {
            return;
        };
        if let Some(root) = remove_node(root, 0, hash_key(key), key) {
            self.root = root;
            self.len -= 1;
        }
    }
}

fn insert_node<K, V>(
    node: &Arc<TrieNode<K, V>>,
    shift: u32,
    hash: u64,
    key: K,
    value: V,
) -> (Arc<TrieNode<K, V>>, bool)
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    match node.as_ref() {
        TrieNode::Branch { bitmap, children } => {
            let bit = bit_for(hash, shift);
            let pos = position(*bitmap, bit);
            let mut children = children.clone();
            if bitmap & bit == 0 {
                children.insert(
                    pos,
                    Arc::new(TrieNode::Leaf {
                        hash,
                        entries: vec![(key, value)],
                    }),
                );
                let branch = TrieNode::Branch {
                    bitmap: bitmap | bit,
                    children,
                };
                return (Arc::new(branch), true);
            }
            let (child, added) =
                insert_node(&children[pos], shift + BITS_PER_LEVEL, hash, key, value);
            children[pos] = child;
            let branch = TrieNode::Branch {
                bitmap: *bitmap,
                children,
            };
            (Arc::new(branch), added)
        }
        TrieNode::Leaf {
            hash: leaf_hash,
            entries,
        } if *leaf_hash == hash => {
            let mut entries = entries.clone();
            let added = match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => {
                    entry.1 = value;
                    false
                }
                None => {
                    entries.push((key, value));
                    true
                }
            };
            (Arc::new(TrieNode::Leaf { hash, entries }), added)
        }
        TrieNode::Leaf {
            hash: leaf_hash, ..
        } => {
            // Two distinct 64 bit hashes always part ways within 13 levels.
            let bit = bit_for(*leaf_hash, shift);
            let branch = Arc::new(TrieNode::Branch {
                bitmap: bit,
                children: vec![node.clone()],
            });
            insert_node(&branch, shift, hash, key, value)
        }
    }
}

/// `None` when the key is absent, `Some(None)` when the node became empty.
fn remove_node<K, V, Q>(
    node: &Arc<TrieNode<K, V>>,
    shift: u32,
    hash: u64,
    key: &Q,
) -> Option<Option<Arc<TrieNode<K, V>>>>
where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Eq + ?Sized,
{
    match node.as_ref() {
        TrieNode::Branch { bitmap, children } => {
            let bit = bit_for(hash, shift);
            if bitmap & bit == 0 {
                return None;
            }
            let pos = position(*bitmap, bit);
            let child = remove_node(&children[pos], shift + BITS_PER_LEVEL, hash, key)?;
            let mut children = children.clone();
            let bitmap = match child {
                Some(child) => {
                    children[pos] = child;
                    *bitmap
                }
                None => {
                    children.remove(pos);
                    bitmap & !bit
                }
            };
            if children.is_empty() {
                return Some(None);
            }
            Some(Some(Arc::new(TrieNode::Branch { bitmap, children })))
        }
        TrieNode::Leaf {
            hash: leaf_hash,
            entries,
        } => {
            if *leaf_hash != hash {
                return None;
            }
            let index = entries.iter().position(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)?;
            let mut entries = entries.clone();
            entries.remove(index);
            if entries.is_empty() {
                return Some(None);
            }
            Some(Some(Arc::new(TrieNode::Leaf { hash, entries })))
        }
    }
}

pub struct Iter<'a, K, V> {
    stack: Vec<&'a TrieNode<K, V>>,
    entries: std::slice::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((k, v)) = self.entries.next() {
                return Some((k, v));
            }
            match self.stack.pop()? {
                TrieNode::Branch { children, .. } => {
                    self.stack.extend(children.iter().map(|child| child.as_ref()))
                }
                TrieNode::Leaf { entries, .. } => self.entries = entries.iter(),
            }
        }
    }
}
