use serde::{de::Error as _, ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer};

use crate::key::{Generation, Key};
use crate::map::SlotMap;
use crate::slot::Slot;
use crate::storage::Storage;

/// A map serializes as its slot table in slot order: one `(generation,
/// value-or-null)` pair per slot. That is enough to rebuild everything —
/// dense storage, reverse map, and free list — while keeping every issued
/// key valid across a round-trip. Dense-storage order is not preserved
/// (values come back packed in slot order), which the iteration contract
/// already leaves unspecified.
impl<T: Serialize, K: Key, S: Storage<T>> Serialize for SlotMap<T, K, S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut seq = serializer.serialize_seq(Some(self.slot_count()))?;

        for slot in self.slot_table() {
            match *slot {
                Slot::Occupied {
                    generation,
                    position,
                } => {
                    seq.serialize_element(&(generation.to_u32(), self.value_at(position)))?;
                }
                Slot::Free { generation, .. } => {
                    seq.serialize_element(&(generation.to_u32(), None::<&T>))?;
                }
            }
        }

        seq.end()
    }
}

impl<'de, T: Deserialize<'de>, K: Key, S: Storage<T>> Deserialize<'de> for SlotMap<T, K, S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let sequence = <Vec<(u32, Option<T>)>>::deserialize(deserializer)?;

        if sequence.len() > K::MAX_SLOTS as usize {
            return Err(D::Error::custom(format!(
                "slot table of {} entries exceeds the key's index space ({})",
                sequence.len(),
                K::MAX_SLOTS
            )));
        }

        let mut map: SlotMap<T, K, S> = SlotMap::default();

        for (raw_generation, value) in sequence {
            let generation = Generation::from_u32(raw_generation)
                .ok_or_else(|| D::Error::custom(format!("invalid generation {}", raw_generation)))?;

            // Occupied slots must hold an issuable generation; free slots
            // may additionally sit at the tombstone (retired).
            let out_of_range = generation.to_u32() > K::MAX_GENERATION
                || (value.is_some() && generation.to_u32() >= K::MAX_GENERATION);
            if out_of_range {
                return Err(D::Error::custom(format!(
                    "generation {} out of range for this key type",
                    raw_generation
                )));
            }

            map.push_slot(generation, value);
        }

        Ok(map)
    }
}

#[cfg(test)]
mod test {
    use crate::{CompactKey, DefaultKey, Key, SlotMap};

    fn round_trip(map: &SlotMap<u32>, expected_json: &str) -> SlotMap<u32> {
        let json = serde_json::to_string(map).unwrap();
        assert_eq!(json, expected_json);

        let de: SlotMap<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(de.len(), map.len());
        assert_eq!(de.slot_count(), map.slot_count());
        de
    }

    #[test]
    fn round_trip_empty() {
        let map: SlotMap<u32> = SlotMap::new();
        round_trip(&map, "[]");
    }

    #[test]
    fn all_occupied() {
        let mut map: SlotMap<u32> = SlotMap::new();
        let a = map.insert(70);
        let b = map.insert(80);
        let c = map.insert(90);

        let de = round_trip(&map, "[[1,70],[1,80],[1,90]]");
        assert_eq!(de.get(a), Some(&70));
        assert_eq!(de.get(b), Some(&80));
        assert_eq!(de.get(c), Some(&90));
    }

    #[test]
    fn freed_slot_in_the_middle() {
        let mut map: SlotMap<u32> = SlotMap::new();
        let a = map.insert(100);
        let b = map.insert(101);
        let c = map.insert(102);
        map.remove(b).unwrap();

        // The freed slot already carries the next generation to issue.
        let de = round_trip(&map, "[[1,100],[2,null],[1,102]]");
        assert_eq!(de.get(a), Some(&100));
        assert_eq!(de.get(b), None);
        assert_eq!(de.get(c), Some(&102));
    }

    #[test]
    fn generations_accumulate() {
        let mut map: SlotMap<u32> = SlotMap::new();
        let mut key = map.insert(50);
        for i in 0..10 {
            map.remove(key);
            key = map.insert(50 + i);
        }

        let de = round_trip(&map, "[[11,59]]");
        assert_eq!(de.get(key), Some(&59));
    }

    #[test]
    fn free_list_rebuilds_in_slot_order() {
        let mut map: SlotMap<u32> = SlotMap::new();
        let a = map.insert(300);
        let b = map.insert(400);
        let c = map.insert(500);
        map.remove(a).unwrap();
        map.remove(b).unwrap();
        map.remove(c).unwrap();

        let mut de = round_trip(&map, "[[2,null],[2,null],[2,null]]");

        // Reinsertion walks the rebuilt free list from the head: slot 0
        // first, each at its recorded generation.
        for expected_slot in 0..3 {
            let key = de.insert(expected_slot);
            assert_eq!(key.slot(), expected_slot);
            assert_eq!(key.generation(), 2);
        }
        assert_eq!(de.slot_count(), 3);
    }

    #[test]
    fn retired_slots_stay_retired() {
        let mut map: SlotMap<u32, CompactKey> = SlotMap::default();
        let mut key = map.insert(0);
        for i in 2..=30 {
            map.remove(key);
            key = map.insert(i);
        }
        map.remove(key);
        assert_eq!(map.slot_count(), 1);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, "[[31,null]]");

        let mut de: SlotMap<u32, CompactKey> = serde_json::from_str(&json).unwrap();
        let fresh = de.insert(99);
        assert_eq!(fresh.slot(), 1);
        assert_eq!(de.slot_count(), 2);
    }

    #[test]
    fn rejects_zero_generation() {
        let result: Result<SlotMap<u32>, _> = serde_json::from_str("[[0,17]]");
        let error = result.unwrap_err().to_string();
        assert!(error.contains("invalid generation"), "{}", error);
    }

    #[test]
    fn rejects_occupied_tombstone_generation() {
        let result: Result<SlotMap<u32, CompactKey>, _> = serde_json::from_str("[[31,17]]");
        let error = result.unwrap_err().to_string();
        assert!(error.contains("out of range"), "{}", error);
    }

    #[test]
    fn rejects_oversized_slot_table() {
        let entries: Vec<String> = (0..2049).map(|_| "[1,null]".to_string()).collect();
        let json = format!("[{}]", entries.join(","));
        let result: Result<SlotMap<u32, CompactKey>, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }

    #[test]
    fn default_key_survives_bit_transport() {
        let mut map: SlotMap<u32> = SlotMap::new();
        map.insert(1);
        let key = map.insert(2);

        let json = serde_json::to_string(&map).unwrap();
        let de: SlotMap<u32> = serde_json::from_str(&json).unwrap();

        // Keys round-tripped through their integer form still resolve.
        let bits = key.to_bits();
        assert_eq!(de.get(DefaultKey::from_bits(bits)), Some(&2));
    }
}
