//! MongoDB driver
//!
//! JSON values cross the boundary as relaxed extended JSON, so
//! `{"$oid": "..."}` and `{"$date": "..."}` round-trip as BSON types.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection, Database};
use node_engine::{Closeable, NodeEngineError, Result};
use serde_json::Value;

use super::{DocumentConnector, DocumentSession, FindOptions, UpdateOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

#[async_trait]
impl DocumentConnector for MongoConnector {
    async fn connect(&self, uri: &str, database: &str) -> Result<Box<dyn DocumentSession>> {
        let client = Client::with_uri_str(uri).await.map_err(map_mongo_error)?;
        let db = client.database(database);
        // the driver connects lazily; ping so connection errors surface here
        if let Err(e) = db.run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(NodeEngineError::connection(format!("Failed to connect to MongoDB: {}", e)));
        }
        Ok(Box::new(MongoSession {
            client: Some(client),
            db,
        }))
    }
}

struct MongoSession {
    client: Option<Client>,
    db: Database,
}

impl MongoSession {
    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl Closeable for MongoSession {
    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentSession for MongoSession {
    async fn find(&mut self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        let mut find = self.collection(collection).find(to_document(filter)?);
        if let Some(limit) = options.limit {
            find = find.limit(limit);
        }
        if let Some(skip) = options.skip {
            find = find.skip(skip);
        }
        if let Some(sort) = &options.sort {
            find = find.sort(to_document(sort)?);
        }
        if let Some(projection) = &options.projection {
            find = find.projection(to_document(projection)?);
        }
        let cursor = find.await.map_err(map_mongo_error)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(map_mongo_error)?;
        Ok(documents.into_iter().map(to_json).collect())
    }

    async fn insert(&mut self, collection: &str, documents: &[Value]) -> Result<Vec<Value>> {
        let documents = documents.iter().map(to_document).collect::<Result<Vec<_>>>()?;
        let count = documents.len();
        let result = self
            .collection(collection)
            .insert_many(documents)
            .await
            .map_err(map_mongo_error)?;
        Ok((0..count)
            .map(|i| {
                result
                    .inserted_ids
                    .get(&i)
                    .cloned()
                    .map(Bson::into_relaxed_extjson)
                    .unwrap_or(Value::Null)
            })
            .collect())
    }

    async fn update(
        &mut self,
        collection: &str,
        filter: &Value,
        update: &Value,
        many: bool,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        let collection = self.collection(collection);
        let filter = to_document(filter)?;
        let update = to_document(update)?;
        let result = if many {
            collection.update_many(filter, update).upsert(upsert).await
        } else {
            collection.update_one(filter, update).upsert(upsert).await
        }
        .map_err(map_mongo_error)?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id.map(Bson::into_relaxed_extjson),
        })
    }

    async fn delete(&mut self, collection: &str, filter: &Value, many: bool) -> Result<u64> {
        let collection = self.collection(collection);
        let filter = to_document(filter)?;
        let result = if many {
            collection.delete_many(filter).await
        } else {
            collection.delete_one(filter).await
        }
        .map_err(map_mongo_error)?;
        Ok(result.deleted_count)
    }

    async fn aggregate(&mut self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>> {
        let pipeline = pipeline.iter().map(to_document).collect::<Result<Vec<_>>>()?;
        let cursor = self
            .collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(map_mongo_error)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(map_mongo_error)?;
        Ok(documents.into_iter().map(to_json).collect())
    }

    async fn count(&mut self, collection: &str, filter: &Value) -> Result<u64> {
        self.collection(collection)
            .count_documents(to_document(filter)?)
            .await
            .map_err(map_mongo_error)
    }
}

fn to_document(value: &Value) -> Result<Document> {
    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(NodeEngineError::invalid_input(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(NodeEngineError::invalid_input(e.to_string())),
    }
}

fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

fn map_mongo_error(e: mongodb::error::Error) -> NodeEngineError {
    match *e.kind {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            NodeEngineError::connection(e.to_string())
        }
        _ => NodeEngineError::operation(e.to_string()),
    }
}
