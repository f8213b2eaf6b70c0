use std::thread;

use pacul::{
    config::StoreConfig,
    storage::{
        codec::RowImage,
        heap::VarHandle,
        table::{SlotRef, Table, TableStore},
    },
    types::{
        PAGE_SIZE, ROW_HEADER_SIZE,
        column::{Column, ColumnType},
        error::StorageError,
        page::SlotState,
        value::Value,
    },
    utils::mock::{
        create_int_table, create_people_table, create_people_table_with_config,
        create_table_with, fill_ints, insert_values, live_values, person,
    },
};
use proptest::prelude::*;

#[test]
fn test_table_init_validates_name() {
    assert!(TableStore::new("users").is_ok());
    assert!(matches!(
        TableStore::new("9lives"),
        Err(StorageError::InvalidIdentifier { .. })
    ));
    assert!(Table::new("").is_err());
}

#[test]
fn test_insert_and_read_back() {
    let mut store = create_people_table("people");
    let slot = insert_values(&mut store, &person(1, "alice", 91.5, true)).unwrap();

    assert_eq!(slot.offset, 0);
    assert_eq!(store.page_count(), 1);
    assert_eq!(store.free_offset(), store.row_size());
    assert_eq!(store.slot_state(slot).unwrap(), SlotState::Live);
    assert_eq!(
        store.read_row(slot).unwrap(),
        Some(person(1, "alice", 91.5, true))
    );
    assert_eq!(store.heap().len(), 1);
}

#[test]
fn test_insert_preserves_null_bitmap_and_skips_null_buffers() {
    let mut store = create_people_table("people");
    let slot = insert_values(
        &mut store,
        &[Value::Integer(2), Value::Null, Value::Null, Value::from(false)],
    )
    .unwrap();

    let view = store.view(slot).unwrap();
    assert!(!view.is_null(0));
    assert!(view.is_null(1));
    assert!(view.is_null(2));
    assert!(!view.is_null(3));
    assert_eq!(view.varchar_bytes(1), None);
    assert_eq!(view.value(1), Value::Null);
    assert!(store.heap().is_empty());
}

#[test]
fn test_varchar_is_truncated_and_padded_to_precision() {
    let mut store = create_people_table("people");
    let long = "abcdefghijklmnopqrstuvwxyz";
    let slot = insert_values(&mut store, &person(1, long, 0.0, false)).unwrap();

    let view = store.view(slot).unwrap();
    assert_eq!(view.varchar_bytes(1).unwrap(), &long.as_bytes()[..16]);
    assert_eq!(view.value(1), Value::from(&long[..16]));

    let short = insert_values(&mut store, &person(2, "bo", 0.0, false)).unwrap();
    let bytes = store.view(short).unwrap().varchar_bytes(1).unwrap();
    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[..2], b"bo");
    assert!(bytes[2..].iter().all(|&b| b == 0));
}

#[test]
fn test_insert_rejects_wrong_row_length() {
    let mut store = create_int_table("numbers");
    let image = RowImage::from_parts(vec![0u8; store.row_size() + 1], vec![None]);
    match store.insert_row(&image) {
        Err(StorageError::InvalidRowLength { expected, actual }) => {
            assert_eq!(expected, store.row_size());
            assert_eq!(actual, store.row_size() + 1);
        }
        other => panic!("expected InvalidRowLength, got {:?}", other),
    }
    assert_eq!(store.page_count(), 0);
}

#[test]
fn test_image_from_older_schema_is_rejected() {
    let mut store = create_int_table("numbers");
    let stale = store.encode(&[Value::Integer(1)]).unwrap();
    store
        .add_column(Column::new("extra", ColumnType::Integer))
        .unwrap();
    assert!(matches!(
        store.insert_row(&stale),
        Err(StorageError::InvalidRowLength { .. })
    ));
}

#[test]
fn test_size_accounting_across_pages() {
    let mut store = create_int_table("numbers");
    let row_size = store.row_size();
    assert_eq!(row_size, ROW_HEADER_SIZE + 8);
    assert_eq!(store.row_size(), store.row_payload_width() + ROW_HEADER_SIZE);

    let per_page = PAGE_SIZE / row_size;
    let n = 2 * per_page + 46;
    let slots = fill_ints(&mut store, 0..n as i64).unwrap();

    assert_eq!(store.page_count(), 3);
    assert_eq!(
        store.free_offset() + (store.page_count() - 1) * per_page * row_size,
        n * row_size
    );
    assert_eq!(slots[per_page - 1].offset, (per_page - 1) * row_size);
    assert_eq!(slots[per_page].offset, 0);
    assert_ne!(slots[per_page].page_id, slots[0].page_id);

    let ids: Vec<i64> = live_values(&store)
        .into_iter()
        .map(|row| match row[0] {
            Value::Integer(v) => v,
            ref other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(ids, (0..n as i64).collect::<Vec<_>>());
}

#[test]
fn test_filling_a_page_exactly_defers_the_next_page() {
    let mut store = create_int_table("numbers");
    let per_page = store.slots_per_page();
    fill_ints(&mut store, 0..per_page as i64).unwrap();

    assert_eq!(store.page_count(), 1);
    assert_eq!(store.free_offset(), per_page * store.row_size());

    insert_values(&mut store, &[Value::Integer(-1)]).unwrap();
    assert_eq!(store.page_count(), 2);
    assert_eq!(store.free_offset(), store.row_size());
}

#[test]
fn test_delete_only_flips_the_deleted_flag() {
    let mut store = create_people_table("people");
    let slot = insert_values(&mut store, &person(1, "alice", 1.0, true)).unwrap();
    let before = store.view(slot).unwrap().raw().to_vec();

    store.delete_row(slot).unwrap();

    let after = store.view(slot).unwrap().raw().to_vec();
    assert_eq!(store.slot_state(slot).unwrap(), SlotState::Tombstoned);
    assert_eq!(before[0], after[0]);
    assert_eq!(before[1], 0);
    assert_eq!(after[1], 1);
    assert_eq!(before[2..], after[2..]);
    // buffers stay allocated until vacuum
    assert_eq!(store.heap().len(), 1);
    assert_eq!(store.read_row(slot).unwrap(), None);
    assert_eq!(store.rows().count(), 0);
}

#[test]
#[should_panic(expected = "delete of non-live slot")]
fn test_double_delete_is_fatal() {
    let mut store = create_int_table("numbers");
    let slot = fill_ints(&mut store, [1]).unwrap()[0];
    store.delete_row(slot).unwrap();
    let _ = store.delete_row(slot);
}

#[test]
#[should_panic(expected = "delete of non-live slot")]
fn test_delete_of_empty_slot_is_fatal() {
    let mut store = create_int_table("numbers");
    let slot = fill_ints(&mut store, [1]).unwrap()[0];
    let next = SlotRef::new(slot.page_id, store.row_size());
    let _ = store.delete_row(next);
}

#[test]
fn test_bad_slot_references_are_recoverable() {
    let mut store = create_int_table("numbers");
    let slot = fill_ints(&mut store, [1]).unwrap()[0];

    assert!(matches!(
        store.delete_row(SlotRef::new(slot.page_id + 100, 0)),
        Err(StorageError::PageNotFound { .. })
    ));
    assert!(matches!(
        store.delete_row(SlotRef::new(slot.page_id, 3)),
        Err(StorageError::InvalidSlot { offset: 3, .. })
    ));
    assert!(matches!(
        store.delete_row(SlotRef::new(slot.page_id, PAGE_SIZE)),
        Err(StorageError::InvalidSlot { .. })
    ));
    assert_eq!(store.slot_state(slot).unwrap(), SlotState::Live);
}

#[test]
fn test_update_reuses_existing_buffer() {
    let mut store = create_people_table("people");
    let slot = insert_values(&mut store, &person(1, "alice", 1.0, true)).unwrap();
    let name_range = store.layout().field(1).range();
    let handle_before = VarHandle::from_slot_bytes(&store.view(slot).unwrap().raw()[name_range.clone()]);

    let image = store.encode(&person(1, "bob", 2.5, false)).unwrap();
    store.update_row(slot, &image).unwrap();

    let handle_after = VarHandle::from_slot_bytes(&store.view(slot).unwrap().raw()[name_range]);
    assert!(handle_before.is_some());
    assert_eq!(handle_before, handle_after);
    assert_eq!(store.heap().len(), 1);
    assert_eq!(store.read_row(slot).unwrap(), Some(person(1, "bob", 2.5, false)));
    assert_eq!(store.free_offset(), store.row_size());
}

#[test]
fn test_update_null_transitions() {
    let mut store = create_people_table("people");
    let slot = insert_values(&mut store, &person(1, "alice", 1.0, true)).unwrap();

    let to_null = store
        .encode(&[Value::Integer(1), Value::Null, Value::Double(1.0), Value::from(true)])
        .unwrap();
    store.update_row(slot, &to_null).unwrap();
    assert!(store.heap().is_empty());
    assert_eq!(store.view(slot).unwrap().value(1), Value::Null);

    let from_null = store.encode(&person(1, "carol", 1.0, true)).unwrap();
    store.update_row(slot, &from_null).unwrap();
    assert_eq!(store.heap().len(), 1);
    assert_eq!(store.view(slot).unwrap().value(1), Value::from("carol"));
}

#[test]
#[should_panic(expected = "update of non-live slot")]
fn test_update_of_tombstone_is_fatal() {
    let mut store = create_int_table("numbers");
    let slot = fill_ints(&mut store, [1]).unwrap()[0];
    store.delete_row(slot).unwrap();
    let image = store.encode(&[Value::Integer(2)]).unwrap();
    let _ = store.update_row(slot, &image);
}

#[test]
fn test_update_rejects_wrong_length() {
    let mut store = create_int_table("numbers");
    let slot = fill_ints(&mut store, [1]).unwrap()[0];
    let image = RowImage::from_parts(vec![0u8; 3], vec![None]);
    assert!(matches!(
        store.update_row(slot, &image),
        Err(StorageError::InvalidRowLength { .. })
    ));
    assert_eq!(store.read_row(slot).unwrap(), Some(vec![Value::Integer(1)]));
}

#[test]
fn test_insert_rolls_back_buffers_on_heap_exhaustion() {
    let config = StoreConfig::default().with_max_heap_bytes(12);
    let mut store = create_table_with(
        "pairs",
        vec![Column::varchar("a", 8), Column::varchar("b", 8)],
        config,
    );

    let result = insert_values(&mut store, &[Value::from("left"), Value::from("right")]);
    assert!(matches!(result, Err(StorageError::HeapExhausted { .. })));
    assert!(store.heap().is_empty());
    assert_eq!(store.page_count(), 0);
    assert_eq!(store.free_offset(), 0);

    // a row that fits still goes in
    insert_values(&mut store, &[Value::from("left"), Value::Null]).unwrap();
    assert_eq!(store.heap().len(), 1);
}

#[test]
fn test_insert_rolls_back_buffers_on_page_budget() {
    let config = StoreConfig::default().with_max_pages(1);
    let mut store = create_people_table_with_config("people", config);
    let per_page = store.slots_per_page();
    for i in 0..per_page {
        insert_values(&mut store, &person(i as i64, "n", 0.0, false)).unwrap();
    }
    let buffers = store.heap().len();

    let result = insert_values(&mut store, &person(-1, "overflow", 0.0, false));
    assert!(matches!(result, Err(StorageError::PageBudgetExhausted { max: 1 })));
    assert_eq!(store.heap().len(), buffers);
    assert_eq!(store.page_count(), 1);
    assert_eq!(store.free_offset(), per_page * store.row_size());
}

#[test]
fn test_slots_iterates_every_state_in_ring_order() {
    let mut store = create_int_table("numbers");
    let slots = fill_ints(&mut store, [1, 2, 3]).unwrap();
    store.delete_row(slots[1]).unwrap();

    let states: Vec<SlotState> = store.slots().take(4).map(|(_, v)| v.state()).collect();
    assert_eq!(
        states,
        vec![SlotState::Live, SlotState::Tombstoned, SlotState::Live, SlotState::Empty]
    );
    assert_eq!(store.slots().count(), store.slots_per_page());

    let stats = store.stats();
    assert_eq!(stats.live_rows, 2);
    assert_eq!(stats.tombstoned_rows, 1);
    assert_eq!(stats.pages, 1);
}

#[test]
fn test_destroy_releases_everything() {
    let mut store = create_people_table("people");
    let mut slots = Vec::new();
    for i in 0..300 {
        slots.push(insert_values(&mut store, &person(i, "someone", 0.0, true)).unwrap());
    }
    store.delete_row(slots[10]).unwrap();
    let pages = store.page_count();

    assert_eq!(store.destroy(), pages);
    assert_eq!(store.page_count(), 0);
    assert!(store.heap().is_empty());
    assert_eq!(store.heap().bytes_in_use(), 0);
}

#[test]
fn test_shared_table_mutates_through_lock() {
    let table = Table::new("counters").unwrap();
    table.add_column(Column::new("n", ColumnType::Integer)).unwrap();

    thread::scope(|scope| {
        for worker in 0..4i64 {
            let table = &table;
            scope.spawn(move || {
                for i in 0..50 {
                    let mut handle = table.lock();
                    let image = handle.encode(&[Value::Integer(worker * 1000 + i)]).unwrap();
                    handle.insert_row(&image).unwrap();
                }
            });
        }
    });

    assert_eq!(table.lock().stats().live_rows, 200);
    assert!(table.try_lock().is_some());
    assert_eq!(table.destroy(), 1);
}

#[test]
fn test_try_lock_fails_while_held() {
    let table = Table::new("locked").unwrap();
    let guard = table.lock();
    assert!(table.try_lock().is_none());
    drop(guard);
    assert!(table.try_lock().is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]
    #[test]
    fn prop_insert_read_round_trip(
        rows in proptest::collection::vec(
            (
                proptest::option::of("[a-z]{0,12}"),
                proptest::option::of(-1.0e6f64..1.0e6),
                any::<bool>(),
            ),
            1..120,
        )
    ) {
        let mut store = create_people_table("people");
        // id is the primary key, so it stays NOT NULL
        let mut expected = Vec::new();
        for (i, (name, score, active)) in rows.iter().enumerate() {
            let values = vec![
                Value::Integer(i as i64),
                name.as_deref().map(Value::from).unwrap_or(Value::Null),
                score.map(Value::Double).unwrap_or(Value::Null),
                Value::from(*active),
            ];
            let slot = insert_values(&mut store, &values).unwrap();
            expected.push((slot, values));
        }
        for (slot, values) in &expected {
            prop_assert_eq!(store.read_row(*slot).unwrap(), Some(values.clone()));
        }
        let non_null_names = rows.iter().filter(|r| r.0.is_some()).count();
        prop_assert_eq!(store.heap().len(), non_null_names);
    }
}
