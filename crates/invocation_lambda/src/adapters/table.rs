//! DynamoDB backed [`TableStore`].
//!
//! Records are addressed by a string partition key and a string sort key;
//! the key attribute names come from configuration. Attribute values are
//! converted to and from plain JSON so handlers never see SDK types.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use invocation_core::{Attributes, CollaboratorError, TableStore, WriteAck};
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone)]
pub struct DynamoTableStore {
    client: aws_sdk_dynamodb::Client,
    partition_key_attribute: String,
    sort_key_attribute: String,
}

impl DynamoTableStore {
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        partition_key_attribute: impl Into<String>,
        sort_key_attribute: impl Into<String>,
    ) -> Self {
        Self {
            client,
            partition_key_attribute: partition_key_attribute.into(),
            sort_key_attribute: sort_key_attribute.into(),
        }
    }

    fn key(&self, partition_key: &str, sort_key: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (
                self.partition_key_attribute.clone(),
                AttributeValue::S(partition_key.to_string()),
            ),
            (
                self.sort_key_attribute.clone(),
                AttributeValue::S(sort_key.to_string()),
            ),
        ])
    }

    fn item_attributes(&self, item: &HashMap<String, AttributeValue>) -> Attributes {
        let mut names: Vec<&String> = item
            .keys()
            .filter(|name| {
                **name != self.partition_key_attribute && **name != self.sort_key_attribute
            })
            .collect();
        names.sort();
        names
            .into_iter()
            .map(|name| (name.clone(), from_attribute_value(&item[name])))
            .collect()
    }
}

fn table_error(table: &str, message: String) -> CollaboratorError {
    CollaboratorError::Table {
        table: table.to_string(),
        message,
    }
}

#[async_trait]
impl TableStore for DynamoTableStore {
    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<Option<Attributes>, CollaboratorError> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(self.key(partition_key, sort_key)))
            .send()
            .await
            .map_err(|error| table_error(table, DisplayErrorContext(&error).to_string()))?;

        Ok(output.item().map(|item| self.item_attributes(item)))
    }

    async fn put_record(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: &str,
        attributes: Attributes,
    ) -> Result<WriteAck, CollaboratorError> {
        let mut item: HashMap<String, AttributeValue> = attributes
            .iter()
            .map(|(name, value)| (name.clone(), to_attribute_value(value)))
            .collect();
        // Key attributes always reflect the addressed record.
        item.extend(self.key(partition_key, sort_key));

        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|error| table_error(table, DisplayErrorContext(&error).to_string()))?;

        Ok(WriteAck {
            table: table.to_string(),
            partition_key: partition_key.to_string(),
            sort_key: sort_key.to_string(),
        })
    }
}

pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(flag) => AttributeValue::Bool(*flag),
        Value::Number(number) => AttributeValue::N(number.to_string()),
        Value::String(text) => AttributeValue::S(text.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute_value).collect()),
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), to_attribute_value(value)))
                .collect(),
        ),
    }
}

pub fn from_attribute_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(flag) => Value::Bool(*flag),
        AttributeValue::N(number) => number_value(number),
        AttributeValue::S(text) => Value::String(text.clone()),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute_value).collect()),
        AttributeValue::M(fields) => {
            let mut names: Vec<&String> = fields.keys().collect();
            names.sort();
            Value::Object(
                names
                    .into_iter()
                    .map(|name| (name.clone(), from_attribute_value(&fields[name])))
                    .collect::<Map<String, Value>>(),
            )
        }
        AttributeValue::Ss(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(items) => {
            Value::Array(items.iter().map(|number| number_value(number)).collect())
        }
        AttributeValue::B(blob) => Value::from(blob.as_ref().to_vec()),
        _ => Value::Null,
    }
}

// Numbers that do not fit a JSON number are kept as their string form.
fn number_value(number: &str) -> Value {
    number
        .parse::<Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(number.to_string()))
}
