//! Associative arrays.
//!
//! Entries live in a slot vector in insertion order, each stamped with a
//! sequence number that never changes. `for (k in a)` keeps the sequence
//! number of the next entry to visit, so the loop body may delete or insert
//! freely: deleted slots are skipped and compacted away later without
//! disturbing a cursor. Lookup goes through an open-addressed index of slot
//! numbers with linear probing.

use super::{AwkStr, Value};

const EMPTY: u32 = u32::MAX;
const TOMB: u32 = u32::MAX - 1;
const MIN_INDEX: usize = 8;

#[derive(Debug)]
struct Slot {
    seq: u64,
    entry: Option<(AwkStr, Value)>,
}

#[derive(Debug, Default)]
pub struct AwkMap {
    /// Sorted by `seq`
    slots: Vec<Slot>,
    index: Vec<u32>,
    /// Index entries that are not EMPTY (live entries plus tombstones)
    used: usize,
    live: usize,
    next_seq: u64,
}

fn hash(key: &str) -> u64 {
    // FNV-1a
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in key.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

impl AwkMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Position in the index holding `key`, if present
    fn find(&self, key: &str) -> Option<usize> {
        if self.index.is_empty() {
            return None;
        }
        let mask = self.index.len() - 1;
        let mut pos = hash(key) as usize & mask;
        loop {
            match self.index[pos] {
                EMPTY => return None,
                TOMB => {}
                slot => {
                    if let Some((k, _)) = &self.slots[slot as usize].entry {
                        if k.as_str() == key {
                            return Some(pos);
                        }
                    }
                }
            }
            pos = (pos + 1) & mask;
        }
    }

    /// Drop deleted slots once they outnumber live ones, then rebuild the
    /// index sized for the remaining slots
    fn rebuild(&mut self) {
        let dead = self.slots.len() - self.live;
        if dead > self.live.max(MIN_INDEX) {
            self.slots.retain(|slot| slot.entry.is_some());
        }
        let capacity = ((self.slots.len() + 1) * 2).next_power_of_two().max(MIN_INDEX);
        self.index = vec![EMPTY; capacity];
        let mask = capacity - 1;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some((key, _)) = &slot.entry else { continue };
            let mut pos = hash(key) as usize & mask;
            while self.index[pos] != EMPTY {
                pos = (pos + 1) & mask;
            }
            self.index[pos] = i as u32;
        }
        self.used = self.live;
    }

    /// Append a key known to be absent and return its slot number
    fn insert_new(&mut self, key: AwkStr, value: Value) -> usize {
        if (self.used + 1) * 4 > self.index.len() * 3 {
            self.rebuild();
        }
        let mask = self.index.len() - 1;
        let mut pos = hash(&key) as usize & mask;
        while self.index[pos] != EMPTY && self.index[pos] != TOMB {
            pos = (pos + 1) & mask;
        }
        if self.index[pos] == EMPTY {
            self.used += 1;
        }
        let slot = self.slots.len();
        self.index[pos] = slot as u32;
        self.slots.push(Slot {
            seq: self.next_seq,
            entry: Some((key, value)),
        });
        self.next_seq += 1;
        self.live += 1;
        slot
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let pos = self.find(key)?;
        self.slots[self.index[pos] as usize].entry.as_ref().map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// The element for `key`, created uninitialized if missing.
    ///
    /// Referencing an element creates it, so this is the lookup the VM uses
    /// for plain reads as well as stores.
    pub fn entry(&mut self, key: &str) -> &mut Value {
        let slot = match self.find(key) {
            Some(pos) => self.index[pos] as usize,
            None => self.insert_new(AwkStr::from(key), Value::Uninitialized),
        };
        match &mut self.slots[slot].entry {
            Some((_, v)) => v,
            None => unreachable!("index points at a live slot"),
        }
    }

    pub fn insert(&mut self, key: AwkStr, value: Value) {
        match self.find(&key) {
            Some(pos) => {
                let slot = self.index[pos] as usize;
                self.slots[slot].entry = Some((key, value));
            }
            None => {
                self.insert_new(key, value);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.find(key)?;
        let slot = self.index[pos] as usize;
        self.index[pos] = TOMB;
        self.live -= 1;
        self.slots[slot].entry.take().map(|(_, v)| v)
    }

    /// Remove every element. Sequence numbers keep counting, so an
    /// iteration cursor taken before the clear sees nothing added after it
    /// as already visited.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.used = 0;
        self.live = 0;
    }

    /// First live entry whose sequence number is at least `cursor`.
    ///
    /// Returns that sequence number so the caller can resume from `seq + 1`.
    pub fn next_key(&self, cursor: u64) -> Option<(u64, AwkStr)> {
        let start = self.slots.partition_point(|slot| slot.seq < cursor);
        self.slots[start..]
            .iter()
            .find_map(|slot| slot.entry.as_ref().map(|(k, _)| (slot.seq, k.clone())))
    }

    /// Live entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&AwkStr, &Value)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref().map(|(k, v)| (k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &AwkStr> {
        self.iter().map(|(k, _)| k)
    }

    /// Allocated slots, live or deleted
    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
