use crate::{
    config::StoreConfig,
    storage::table::{SlotRef, TableStore},
    types::{
        column::{Column, ColumnType},
        error::Result,
        value::Value,
    },
};

/// Table with a single INTEGER column `id`.
pub fn create_int_table(name: &str) -> TableStore {
    create_table_with(name, vec![Column::new("id", ColumnType::Integer)], StoreConfig::default())
}

/// Table with `id INTEGER, name VARCHAR(16), score DOUBLE, active BOOL`.
pub fn create_people_table(name: &str) -> TableStore {
    create_people_table_with_config(name, StoreConfig::default())
}

pub fn create_people_table_with_config(name: &str, config: StoreConfig) -> TableStore {
    create_table_with(
        name,
        vec![
            Column::new("id", ColumnType::Integer).primary_key(),
            Column::varchar("name", 16),
            Column::new("score", ColumnType::Double),
            Column::new("active", ColumnType::TinyInt),
        ],
        config,
    )
}

pub fn create_table_with(name: &str, columns: Vec<Column>, config: StoreConfig) -> TableStore {
    let mut store = TableStore::with_config(name, config).expect("valid table name");
    for column in columns {
        store.add_column(column).expect("valid column");
    }
    store
}

pub fn person(id: i64, name: &str, score: f64, active: bool) -> Vec<Value> {
    vec![
        Value::Integer(id),
        Value::from(name),
        Value::Double(score),
        Value::from(active),
    ]
}

/// Encodes `values` against the table's catalog and inserts them.
pub fn insert_values(store: &mut TableStore, values: &[Value]) -> Result<SlotRef> {
    let image = store.encode(values)?;
    store.insert_row(&image)
}

/// Inserts `ids` into a table whose first column is INTEGER.
pub fn fill_ints<I>(store: &mut TableStore, ids: I) -> Result<Vec<SlotRef>>
where
    I: IntoIterator<Item = i64>,
{
    ids.into_iter()
        .map(|id| insert_values(store, &[Value::Integer(id)]))
        .collect()
}

/// Values of every LIVE row in ring order.
pub fn live_values(store: &TableStore) -> Vec<Vec<Value>> {
    store.rows().map(|(_, view)| view.values()).collect()
}
