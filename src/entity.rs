use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// One app to collect data for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "appid")]
    pub id: u64,
    pub name: String,
}

impl Entity {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Column name -> value, as returned by a data source. May carry more keys than the
/// sink schema declares, and usually fewer.
pub type Record = Map<String, Value>;

/// Smallest record a source may degrade to: just the app's id and name under the
/// source's own column names.
pub fn minimal_record(id_column: &str, id: u64, name: &str) -> Record {
    let mut record = Record::new();
    record.insert(id_column.to_string(), Value::from(id));
    record.insert("name".to_string(), Value::from(name));
    record
}

/// Reads an `appid,name` CSV as written by [`save_entities`].
pub fn load_entities(path: impl AsRef<Path>) -> Result<Vec<Entity>> {
    let mut reader = csv::Reader::from_path(path)?;
    let entities = reader
        .deserialize::<Entity>()
        .collect::<core::result::Result<Vec<_>, _>>()?;
    Ok(entities)
}

pub fn save_entities(path: impl AsRef<Path>, entities: &[Entity]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for entity in entities {
        writer.serialize(entity)?;
    }
    writer.flush()?;
    Ok(())
}
