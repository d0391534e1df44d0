//! DynamoDB-backed document store.
//!
//! Single-table layout: `PK` holds the collection name, `SK` the document id,
//! `version` the revision counter and `doc` the document body as a map.
//! Preconditions become condition expressions on `version`; multi-document
//! batches go through `TransactWriteItems`.

use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, TransactWriteItem};
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use doeklus_atoms::store::{Document, DocumentStore, Filter, Query, Revision, Write};
use doeklus_atoms::StoreError;

type Item = HashMap<String, AttributeValue>;

pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

pub fn from_attribute(attr: &AttributeValue) -> Result<Value, String> {
    Ok(match attr {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n)?,
        AttributeValue::L(items) => Value::Array(
            items
                .iter()
                .map(from_attribute)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        AttributeValue::M(map) => Value::Object(from_item(map)?),
        other => return Err(format!("unsupported attribute {:?}", other)),
    })
}

fn parse_number(n: &str) -> Result<Value, String> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Value::from(i));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("invalid number {}", n))
}

fn from_item(map: &Item) -> Result<Map<String, Value>, String> {
    map.iter()
        .map(|(k, v)| from_attribute(v).map(|v| (k.clone(), v)))
        .collect()
}

fn key(collection: &str, id: &str) -> Item {
    HashMap::from([
        ("PK".to_string(), AttributeValue::S(collection.to_string())),
        ("SK".to_string(), AttributeValue::S(id.to_string())),
    ])
}

fn to_document(collection: &str, item: &Item) -> Result<Document, StoreError> {
    let id = item
        .get("SK")
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();
    let malformed = |reason: String| StoreError::Malformed {
        collection: collection.to_string(),
        id: id.clone(),
        reason,
    };
    let version = item
        .get("version")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| malformed("missing version".into()))?;
    let data = match item.get("doc") {
        Some(AttributeValue::M(doc)) => from_item(doc).map_err(malformed)?,
        _ => return Err(malformed("missing doc".into())),
    };
    Ok(Document {
        id: id.clone(),
        version,
        data,
    })
}

/// Condition expression and its placeholders for a write's precondition.
struct Condition {
    expression: &'static str,
    names: Option<(String, String)>,
    values: Option<(String, AttributeValue)>,
}

fn revision_condition(revision: Revision) -> Condition {
    match revision {
        Revision::New => Condition {
            expression: "attribute_not_exists(PK)",
            names: None,
            values: None,
        },
        Revision::Exactly(v) => version_condition(v),
    }
}

fn version_condition(expected: u64) -> Condition {
    Condition {
        expression: "#version = :expected",
        names: Some(("#version".into(), "version".into())),
        values: Some((":expected".into(), AttributeValue::N(expected.to_string()))),
    }
}

fn put_item(collection: &str, id: &str, data: &Map<String, Value>, revision: Revision) -> Item {
    let mut item = key(collection, id);
    item.insert(
        "version".into(),
        AttributeValue::N(revision.next().to_string()),
    );
    item.insert(
        "doc".into(),
        AttributeValue::M(
            data.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    );
    item
}

fn unavailable<E, R>(err: &SdkError<E, R>) -> Option<StoreError> {
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            Some(StoreError::Unavailable("DynamoDB unreachable".into()))
        }
        _ => None,
    }
}

/// Map the per-item cancellation reason codes of a cancelled transaction.
/// `codes[i]` belongs to `batch[i]`; items that did not fail report `"None"`.
fn cancellation_error(batch: &[Write], codes: &[Option<&str>]) -> StoreError {
    let failed = |code: &str| codes.iter().position(|c| *c == Some(code));
    if let Some(write) = failed("ConditionalCheckFailed").and_then(|i| batch.get(i)) {
        let (collection, id) = write.target();
        return StoreError::Conflict {
            collection: collection.to_string(),
            id: id.to_string(),
        };
    }
    let transient = ["TransactionConflict", "ThrottlingError", "ProvisionedThroughputExceeded"];
    if let Some(code) = transient.into_iter().find(|code| failed(*code).is_some()) {
        return StoreError::Unavailable(format!("transaction cancelled: {}", code));
    }
    StoreError::Backend(format!("transaction cancelled: {:?}", codes))
}

impl DynamoStore {
    fn transact_item(&self, write: &Write) -> Result<TransactWriteItem, StoreError> {
        let build_err = |e: aws_sdk_dynamodb::error::BuildError| StoreError::Backend(e.to_string());
        match write {
            Write::Put {
                collection,
                id,
                data,
                revision,
            } => {
                let cond = revision_condition(*revision);
                let put = Put::builder()
                    .table_name(&self.table_name)
                    .set_item(Some(put_item(collection, id, data, *revision)))
                    .condition_expression(cond.expression)
                    .set_expression_attribute_names(cond.names.map(|(k, v)| HashMap::from([(k, v)])))
                    .set_expression_attribute_values(
                        cond.values.map(|(k, v)| HashMap::from([(k, v)])),
                    )
                    .build()
                    .map_err(build_err)?;
                Ok(TransactWriteItem::builder().put(put).build())
            }
            Write::Delete {
                collection,
                id,
                expected,
            } => {
                let mut delete = Delete::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(key(collection, id)));
                if let Some(v) = expected {
                    let cond = version_condition(*v);
                    delete = delete
                        .condition_expression(cond.expression)
                        .set_expression_attribute_names(
                            cond.names.map(|(k, v)| HashMap::from([(k, v)])),
                        )
                        .set_expression_attribute_values(
                            cond.values.map(|(k, v)| HashMap::from([(k, v)])),
                        );
                }
                Ok(TransactWriteItem::builder()
                    .delete(delete.build().map_err(build_err)?)
                    .build())
            }
        }
    }

    async fn commit_one(&self, write: &Write) -> Result<(), StoreError> {
        let (collection, id) = write.target();
        let conflict = || StoreError::Conflict {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        match write {
            Write::Put { data, revision, .. } => {
                let cond = revision_condition(*revision);
                self.client
                    .put_item()
                    .table_name(&self.table_name)
                    .set_item(Some(put_item(collection, id, data, *revision)))
                    .condition_expression(cond.expression)
                    .set_expression_attribute_names(cond.names.map(|(k, v)| HashMap::from([(k, v)])))
                    .set_expression_attribute_values(
                        cond.values.map(|(k, v)| HashMap::from([(k, v)])),
                    )
                    .send()
                    .await
                    .map_err(|e| {
                        if let Some(err) = unavailable(&e) {
                            return err;
                        }
                        let service = e.into_service_error();
                        if service.is_conditional_check_failed_exception() {
                            conflict()
                        } else if service.is_provisioned_throughput_exceeded_exception() {
                            StoreError::Unavailable(service.to_string())
                        } else {
                            StoreError::Backend(format!("DynamoDB put_item error: {}", service))
                        }
                    })?;
            }
            Write::Delete { expected, .. } => {
                let mut request = self
                    .client
                    .delete_item()
                    .table_name(&self.table_name)
                    .set_key(Some(key(collection, id)));
                if let Some(v) = expected {
                    let cond = version_condition(*v);
                    request = request
                        .condition_expression(cond.expression)
                        .set_expression_attribute_names(
                            cond.names.map(|(k, v)| HashMap::from([(k, v)])),
                        )
                        .set_expression_attribute_values(
                            cond.values.map(|(k, v)| HashMap::from([(k, v)])),
                        );
                }
                request.send().await.map_err(|e| {
                    if let Some(err) = unavailable(&e) {
                        return err;
                    }
                    let service = e.into_service_error();
                    if service.is_conditional_check_failed_exception() {
                        conflict()
                    } else {
                        StoreError::Backend(format!("DynamoDB delete_item error: {}", service))
                    }
                })?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for DynamoStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key(collection, id)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| {
                unavailable(&e).unwrap_or_else(|| {
                    StoreError::Backend(format!("DynamoDB get_item error: {}", e.into_service_error()))
                })
            })?;

        result
            .item()
            .map(|item| to_document(collection, item))
            .transpose()
    }

    /// Reads every page of the collection's partition; filters run server
    /// side, but ordering and `limit` are applied in memory, so a limit does
    /// not bound the read cost.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut names = HashMap::from([("#doc".to_string(), "doc".to_string())]);
        let mut values = HashMap::from([(
            ":pk".to_string(),
            AttributeValue::S(collection.to_string()),
        )]);
        let mut clauses = Vec::new();
        for (i, filter) in query.filters.iter().enumerate() {
            match filter {
                Filter::Eq(field, value) => {
                    names.insert(format!("#f{}", i), field.clone());
                    values.insert(format!(":f{}", i), to_attribute(value));
                    clauses.push(format!("#doc.#f{} = :f{}", i, i));
                }
            }
        }
        let filter_expression = (!clauses.is_empty()).then(|| clauses.join(" AND "));
        if filter_expression.is_none() {
            names.clear();
        }

        let mut docs = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk")
                .set_filter_expression(filter_expression.clone())
                .set_expression_attribute_names((!names.is_empty()).then(|| names.clone()))
                .set_expression_attribute_values(Some(values.clone()))
                .set_exclusive_start_key(start_key.take())
                .consistent_read(true)
                .send()
                .await
                .map_err(|e| {
                    unavailable(&e).unwrap_or_else(|| {
                        StoreError::Backend(format!("DynamoDB query error: {}", e.into_service_error()))
                    })
                })?;

            for item in result.items() {
                docs.push(to_document(collection, item)?);
            }
            match result.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }

        Ok(query.finish(docs))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        match writes.as_slice() {
            [] => Ok(()),
            [single] => self.commit_one(single).await,
            batch => {
                let items = batch
                    .iter()
                    .map(|w| self.transact_item(w))
                    .collect::<Result<Vec<_>, _>>()?;
                self.client
                    .transact_write_items()
                    .set_transact_items(Some(items))
                    .send()
                    .await
                    .map_err(|e| {
                        if let Some(err) = unavailable(&e) {
                            return err;
                        }
                        let service = e.into_service_error();
                        match &service {
                            TransactWriteItemsError::TransactionCanceledException(ex) => {
                                let codes: Vec<Option<&str>> = ex
                                    .cancellation_reasons()
                                    .iter()
                                    .map(|r| r.code())
                                    .collect();
                                cancellation_error(batch, &codes)
                            }
                            _ if service.is_transaction_in_progress_exception()
                                || service.is_provisioned_throughput_exceeded_exception() =>
                            {
                                StoreError::Unavailable(service.to_string())
                            }
                            _ => StoreError::Backend(format!(
                                "DynamoDB transact_write_items error: {}",
                                service
                            )),
                        }
                    })?;
                tracing::debug!("Committed {} writes in one transaction", batch.len());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn documents_survive_the_attribute_mapping() {
        let value = json!({
            "status": "open",
            "bids": [{"amount": 120.5, "status": "pending"}],
            "klusserId": null,
            "read": false,
            "count": 3
        });
        let attr = to_attribute(&value);
        assert_eq!(from_attribute(&attr).unwrap(), value);
    }

    #[test]
    fn items_carry_the_next_version() {
        let data = json!({"service": "Tuin"}).as_object().cloned().unwrap();
        let item = put_item("tasks", "t1", &data, Revision::Exactly(4));
        assert_eq!(item["PK"], AttributeValue::S("tasks".into()));
        assert_eq!(item["version"], AttributeValue::N("5".into()));

        let doc = to_document("tasks", &item).unwrap();
        assert_eq!(doc.id, "t1");
        assert_eq!(doc.version, 5);
        assert_eq!(doc.data, data);
    }

    #[test]
    fn cancelled_transactions_name_the_failed_write() {
        let data = json!({"status": "assigned"}).as_object().cloned().unwrap();
        let batch = vec![
            Write::put("tasks", "t1", data.clone(), Revision::Exactly(3)),
            Write::put("users", "k1", data, Revision::Exactly(7)),
        ];

        match cancellation_error(&batch, &[Some("None"), Some("ConditionalCheckFailed")]) {
            StoreError::Conflict { collection, id } => {
                assert_eq!((collection.as_str(), id.as_str()), ("users", "k1"));
            }
            other => panic!("expected a conflict, got {:?}", other),
        }

        let err = cancellation_error(&batch, &[Some("TransactionConflict"), Some("None")]);
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.is_retryable());

        let err = cancellation_error(&batch, &[Some("ValidationError"), None]);
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn items_without_a_body_are_malformed() {
        let item = key("tasks", "t1");
        assert!(matches!(
            to_document("tasks", &item),
            Err(StoreError::Malformed { .. })
        ));
    }
}
