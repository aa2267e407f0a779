//! Slotted heap page and its binary codec.
//!
//! Layout of a page of `PAGE_SIZE` bytes:
//!
//! ```text
//! [header bitmap: ceil(slots / 8) bytes][slot 0][slot 1]...[slot n-1][zero padding]
//! ```
//!
//! Bit `i` of the header (byte `i / 8`, bit `i % 8`, least significant first) is set
//! iff slot `i` holds a live tuple. Every slot is exactly `schema.byte_width()` bytes.
//! Dead slots and the trailing padding are written as zeros, so two pages with the
//! same live tuples always encode to the same bytes.

use crate::access::schema::RecordSchema;
use crate::access::tuple::{RecordId, TupleRecord};
use crate::access::value::Field;
use crate::error::{DbError, Result};
use crate::storage::page::{PageBytes, PageId};
use crate::storage::PAGE_SIZE;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Number of slots that fit on a page for rows of `slot_width` bytes.
///
/// Each slot costs `slot_width * 8` bits of payload plus one header bit.
pub fn slots_per_page(slot_width: usize) -> usize {
    (PAGE_SIZE * 8) / (slot_width * 8 + 1)
}

/// Bytes taken by the header bitmap for `slots` slots.
pub fn header_len(slots: usize) -> usize {
    slots.div_ceil(8)
}

/// A decoded page of fixed-width tuples.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<RecordSchema>,
    slots: Vec<Option<TupleRecord>>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// An empty page with every slot free.
    pub fn new(page_id: PageId, schema: Arc<RecordSchema>) -> Self {
        let slot_count = slots_per_page(schema.byte_width());
        Self {
            page_id,
            schema,
            slots: vec![None; slot_count],
            dirtied_by: None,
        }
    }

    /// Decodes a raw page image. Only slots whose header bit is set are exposed.
    pub fn decode(page_id: PageId, data: &[u8], schema: Arc<RecordSchema>) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::corrupt(
                page_id,
                format!("expected {} bytes, got {}", PAGE_SIZE, data.len()),
            ));
        }

        let slot_width = schema.byte_width();
        let slot_count = slots_per_page(slot_width);
        let header = &data[..header_len(slot_count)];

        // Bits past the last slot must be clear.
        for bit in slot_count..header.len() * 8 {
            if header[bit / 8] & (1 << (bit % 8)) != 0 {
                return Err(DbError::corrupt(
                    page_id,
                    format!("header marks slot {} but page holds {}", bit, slot_count),
                ));
            }
        }

        let body = &data[header.len()..];
        let mut slots = Vec::with_capacity(slot_count);
        for slot in 0..slot_count {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                slots.push(None);
                continue;
            }
            let bytes = &body[slot * slot_width..(slot + 1) * slot_width];
            let tuple = Self::decode_slot(&schema, bytes)
                .map_err(|reason| DbError::corrupt(page_id, format!("slot {}: {}", slot, reason)))?;
            slots.push(Some(tuple.with_record_id(RecordId::new(page_id, slot))));
        }

        Ok(Self {
            page_id,
            schema,
            slots,
            dirtied_by: None,
        })
    }

    fn decode_slot(schema: &RecordSchema, bytes: &[u8]) -> std::result::Result<TupleRecord, String> {
        let mut offset = 0;
        let mut fields = Vec::with_capacity(schema.len());
        for column in schema.fields() {
            let len = column.field_type.byte_len();
            fields.push(Field::decode(column.field_type, &bytes[offset..offset + len])?);
            offset += len;
        }
        Ok(TupleRecord::new(fields))
    }

    /// Encodes the page into its on-disk image.
    pub fn encode(&self) -> Result<Box<PageBytes>> {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        let slot_width = self.schema.byte_width();
        let header_size = header_len(self.slots.len());

        for (slot, tuple) in self.slots.iter().enumerate() {
            let Some(tuple) = tuple else { continue };
            data[slot / 8] |= 1 << (slot % 8);

            let mut offset = header_size + slot * slot_width;
            for (value, column) in tuple.fields().iter().zip(self.schema.fields()) {
                let len = column.field_type.byte_len();
                value.encode_into(column.field_type, &mut data[offset..offset + len])?;
                offset += len;
            }
        }

        Ok(data)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    pub fn num_empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Live tuples in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = &TupleRecord> {
        self.slots.iter().flatten()
    }

    /// Stores the tuple in the first free slot and returns where it landed.
    pub fn insert_tuple(&mut self, tuple: TupleRecord) -> Result<RecordId> {
        self.schema.check(&tuple)?;

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(DbError::PageFull(self.page_id))?;
        let record_id = RecordId::new(self.page_id, slot);
        self.slots[slot] = Some(tuple.with_record_id(record_id));
        Ok(record_id)
    }

    pub fn delete_tuple(&mut self, record_id: RecordId) -> Result<()> {
        let not_found = DbError::TupleNotFound {
            page_id: record_id.page_id,
            slot: record_id.slot,
        };
        if record_id.page_id != self.page_id {
            return Err(not_found);
        }
        match self.slots.get_mut(record_id.slot) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(not_found),
        }
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtied_by = tid;
    }

    /// The transaction that last modified the page since it was loaded or flushed.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }
}

impl PartialEq for HeapPage {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.slots == other.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::FieldType;
    use crate::storage::page::TableId;
    use rand::distributions::Alphanumeric;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pid(n: u32) -> PageId {
        PageId::new(TableId(3), n)
    }

    fn int_schema(columns: usize) -> Arc<RecordSchema> {
        Arc::new(RecordSchema::from_types(&vec![FieldType::Int; columns]))
    }

    fn mixed_schema() -> Arc<RecordSchema> {
        Arc::new(RecordSchema::new(vec![
            (FieldType::Int, "id"),
            (FieldType::Text(5), "name"),
        ]))
    }

    #[test]
    fn test_slot_arithmetic() {
        // Four ints: 16-byte slots, 254 slots, 32 header bytes, page exactly full.
        assert_eq!(slots_per_page(16), 254);
        assert_eq!(header_len(254), 32);

        for width in [1, 4, 12, 16, 100, 1000] {
            let slots = slots_per_page(width);
            assert!(header_len(slots) + slots * width <= PAGE_SIZE);
            // One more slot must not fit.
            assert!(header_len(slots + 1) + (slots + 1) * width > PAGE_SIZE);
        }
    }

    #[test]
    fn test_zeroed_bytes_decode_to_empty_page() -> Result<()> {
        let schema = int_schema(2);
        let page = HeapPage::decode(pid(0), &[0u8; PAGE_SIZE], schema.clone())?;
        assert_eq!(page.tuples().count(), 0);
        assert_eq!(page.num_empty_slots(), slots_per_page(8));
        assert_eq!(page, HeapPage::new(pid(0), schema));
        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let schema = mixed_schema();
        let mut page = HeapPage::new(pid(1), schema.clone());
        page.insert_tuple(TupleRecord::new(vec![1.into(), "ann".into()]))?;
        page.insert_tuple(TupleRecord::new(vec![(-7).into(), "".into()]))?;
        let gone = page.insert_tuple(TupleRecord::new(vec![3.into(), "carla".into()]))?;
        page.insert_tuple(TupleRecord::new(vec![4.into(), "dee".into()]))?;
        page.delete_tuple(gone)?;

        let bytes = page.encode()?;
        let decoded = HeapPage::decode(pid(1), bytes.as_ref(), schema)?;
        assert_eq!(decoded, page);
        assert_eq!(decoded.encode()?, bytes);
        assert!(!decoded.is_slot_used(2));

        let ids: Vec<_> = decoded.tuples().map(|t| t.field(0).cloned()).collect();
        assert_eq!(ids, vec![Some(1.into()), Some((-7).into()), Some(4.into())]);
        Ok(())
    }

    fn random_field(rng: &mut StdRng, field_type: FieldType) -> Field {
        match field_type {
            FieldType::Int => Field::Int(rng.gen()),
            FieldType::Text(width) => {
                let len = match rng.gen_range(0..3) {
                    0 => 0,
                    1 => width,
                    _ => rng.gen_range(0..=width),
                };
                let text: String = (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect();
                Field::Text(text)
            }
        }
    }

    #[test]
    fn test_generated_pages_round_trip() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(42);
        let schemas = [
            vec![FieldType::Int],
            vec![FieldType::Text(3), FieldType::Int, FieldType::Text(17)],
            vec![FieldType::Int, FieldType::Text(200)],
            vec![FieldType::Text(1000)],
        ];

        for types in &schemas {
            let schema = Arc::new(RecordSchema::from_types(types));
            for round in 0..12 {
                let mut page = HeapPage::new(pid(round), schema.clone());
                let slots = page.slot_count();
                // Round 0 fills the page and leaves it full.
                let inserts = if round == 0 { slots } else { rng.gen_range(0..=slots) };
                for _ in 0..inserts {
                    let fields = types.iter().map(|&ty| random_field(&mut rng, ty)).collect();
                    page.insert_tuple(TupleRecord::new(fields))?;
                }
                if round > 0 {
                    let dead_ratio = rng.gen_range(0.0..1.0);
                    for slot in 0..slots {
                        if page.is_slot_used(slot) && rng.gen_bool(dead_ratio) {
                            page.delete_tuple(RecordId::new(pid(round), slot))?;
                        }
                    }
                } else {
                    assert_eq!(page.num_empty_slots(), 0);
                }

                let bytes = page.encode()?;
                let decoded = HeapPage::decode(pid(round), bytes.as_ref(), schema.clone())?;
                assert_eq!(decoded, page);
                for slot in 0..slots {
                    assert_eq!(decoded.is_slot_used(slot), page.is_slot_used(slot));
                }
                assert!(decoded.tuples().eq(page.tuples()));
                assert_eq!(decoded.encode()?, bytes);
            }
        }
        Ok(())
    }

    #[test]
    fn test_decoded_tuples_carry_record_ids() -> Result<()> {
        let mut page = HeapPage::new(pid(2), int_schema(1));
        page.insert_tuple(TupleRecord::new(vec![10.into()]))?;
        page.insert_tuple(TupleRecord::new(vec![20.into()]))?;

        let decoded = HeapPage::decode(pid(2), page.encode()?.as_ref(), int_schema(1))?;
        let rids: Vec<_> = decoded.tuples().map(|t| t.record_id()).collect();
        assert_eq!(
            rids,
            vec![Some(RecordId::new(pid(2), 0)), Some(RecordId::new(pid(2), 1))]
        );
        Ok(())
    }

    #[test]
    fn test_fill_page() -> Result<()> {
        let schema = int_schema(4);
        let mut page = HeapPage::new(pid(0), schema);
        for i in 0..254 {
            page.insert_tuple(TupleRecord::new(vec![i.into(); 4]))?;
        }
        assert_eq!(page.num_empty_slots(), 0);
        let err = page.insert_tuple(TupleRecord::new(vec![0.into(); 4])).unwrap_err();
        assert!(matches!(err, DbError::PageFull(_)));

        // A freed slot is reused first.
        page.delete_tuple(RecordId::new(pid(0), 17))?;
        let rid = page.insert_tuple(TupleRecord::new(vec![99.into(); 4]))?;
        assert_eq!(rid.slot, 17);
        Ok(())
    }

    #[test]
    fn test_wrong_length_is_corrupt() {
        let err = HeapPage::decode(pid(0), &[0u8; 100], int_schema(1)).unwrap_err();
        assert!(matches!(err, DbError::CorruptPage { .. }));
    }

    #[test]
    fn test_header_bit_beyond_capacity_is_corrupt() {
        // Three ints: 337 slots, 43 header bytes, bits 337..344 are padding.
        let schema = int_schema(3);
        assert_eq!(slots_per_page(12), 337);
        let mut data = [0u8; PAGE_SIZE];
        data[42] |= 1 << 1;

        let err = HeapPage::decode(pid(0), &data, schema).unwrap_err();
        assert!(matches!(err, DbError::CorruptPage { .. }));
    }

    #[test]
    fn test_bad_text_length_is_corrupt() {
        let schema = mixed_schema();
        let mut data = [0u8; PAGE_SIZE];
        let header = header_len(slots_per_page(schema.byte_width()));
        data[0] = 1;
        // Text length prefix of slot 0 claims 200 bytes in a 5-byte column.
        data[header + 4 + 3] = 200;

        let err = HeapPage::decode(pid(0), &data, schema).unwrap_err();
        assert!(matches!(err, DbError::CorruptPage { .. }));
    }

    #[test]
    fn test_insert_rejects_mismatched_tuple() {
        let mut page = HeapPage::new(pid(0), mixed_schema());
        let err = page
            .insert_tuple(TupleRecord::new(vec![1.into(), "much too long".into()]))
            .unwrap_err();
        assert!(matches!(err, DbError::SchemaMismatch(_)));
        assert_eq!(page.tuples().count(), 0);
    }

    #[test]
    fn test_delete_errors() -> Result<()> {
        let mut page = HeapPage::new(pid(0), int_schema(1));
        let rid = page.insert_tuple(TupleRecord::new(vec![1.into()]))?;
        page.delete_tuple(rid)?;
        assert!(matches!(
            page.delete_tuple(rid),
            Err(DbError::TupleNotFound { .. })
        ));
        assert!(matches!(
            page.delete_tuple(RecordId::new(pid(9), 0)),
            Err(DbError::TupleNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_dirty_marker() {
        let mut page = HeapPage::new(pid(0), int_schema(1));
        assert!(!page.is_dirty());
        page.mark_dirty(Some(TransactionId::new(4)));
        assert_eq!(page.dirtied_by(), Some(TransactionId::new(4)));
        page.mark_dirty(None);
        assert!(!page.is_dirty());
    }
}
