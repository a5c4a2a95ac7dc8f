//! Single-resource actions: get, list, create, update, upsert, delete.

use crate::config::{ActionSettings, ModelDef};
use crate::error::{ActionError, ActionResult, StoreError};
use crate::input::ActionInput;
use crate::resource::ResourceSpec;
use crate::service::associations::{apply_load_direct, fetch_set, parse_load_direct};
use crate::service::auth::authorize;
use crate::service::fields::{
    check_required_fields, create_data, get_lookup_field_data, merge_fields, prepare_field_data, update_data,
    upsert_data,
};
use crate::service::json_api::{self, Output};
use crate::service::query::{build_predicates, columns_to_return, page_window, resolve_order_by};
use crate::service::scope::ActionScope;
use crate::store::{FetchQuery, Record, RecordSet, Store};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

/// Runs resource actions against one store.
///
/// Events are emitted to the injected dispatcher only; the default discards them.
pub struct Actions<S: Store> {
    pub(crate) store: S,
    pub(crate) settings: ActionSettings,
    dispatch: Dispatch,
}

fn to_json<T: Serialize>(value: &T) -> ActionResult<Value> {
    serde_json::to_value(value).map_err(|e| ActionError::ThirdParty(e.to_string()))
}

/// Lookup failures: an empty result is the resource's 404, anything else passes through.
pub(crate) fn not_found(model: &str) -> impl FnOnce(StoreError) -> ActionError + '_ {
    move |err| match err {
        StoreError::EmptyResult | StoreError::NoRowsDeleted => ActionError::ResourceNotFound(model.to_string()),
        other => ActionError::third_party(other),
    }
}

impl<S: Store> Actions<S> {
    pub fn new(store: S) -> Self {
        Actions {
            store,
            settings: ActionSettings::default(),
            dispatch: Dispatch::none(),
        }
    }

    pub fn with_settings(mut self, settings: ActionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Route this instance's events to `dispatch`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &ActionSettings {
        &self.settings
    }

    pub(crate) fn logged<F: Future>(&self, action: F) -> impl Future<Output = F::Output> {
        action.with_subscriber(self.dispatch.clone())
    }

    fn model_for(&self, spec: &ResourceSpec) -> ActionResult<&ModelDef> {
        let model = self
            .store
            .model(&spec.model_name)
            .ok_or_else(|| ActionError::ModelNotRecognized(spec.model_name.clone()))?;
        spec.validate()?;
        Ok(model)
    }

    /// Whitelisted fields after the required-field check.
    fn resolve_fields(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>) -> ActionResult<Map<String, Value>> {
        let fields = prepare_field_data(spec.field_specs(), &input.fields);
        check_required_fields(spec.field_specs(), &fields).map_err(ActionError::MissingFields)?;
        Ok(fields)
    }

    fn read_query(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>, fields: &Map<String, Value>) -> FetchQuery {
        let load_direct = parse_load_direct(input.load_direct.as_deref());
        FetchQuery {
            predicates: build_predicates(spec.field_specs(), fields),
            order_by: resolve_order_by(input.order_by.as_deref(), spec.default_order_by.as_deref()),
            columns: columns_to_return(spec.columns_to_return.as_ref(), input.column_set.as_deref()),
            with_related: fetch_set(input.relations.as_deref(), &load_direct),
            page: None,
        }
    }

    fn finish_record(&self, input: &ActionInput<'_, S::Scope>, record: &mut Record) {
        let load_direct = parse_load_direct(input.load_direct.as_deref());
        apply_load_direct(record, &load_direct, input.relations.as_deref());
    }

    /// Fetch one record; 404 when nothing matches.
    pub async fn get_item(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>) -> ActionResult<Record> {
        self.logged(self.fetch_item(spec, input)).await
    }

    pub(crate) async fn fetch_item(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>) -> ActionResult<Record> {
        let model = self.model_for(spec)?;
        let fields = self.resolve_fields(spec, input)?;
        authorize(input.auth_bundle.as_ref(), spec.auth.as_ref(), &fields)?;
        let query = self.read_query(spec, input, &fields);
        tracing::debug!(action = "getItem", model = %model.name, query = ?query, "executing");

        let scope = ActionScope::enter(&self.store, input.transacting).await?;
        let result = self
            .store
            .fetch(scope.handle(), &model.name, &query)
            .await
            .map_err(not_found(&spec.model_name))
            .map(|mut record| {
                self.finish_record(input, &mut record);
                record
            });
        scope.release(&self.store, result).await
    }

    /// `get_item` rendered as `output`.
    pub async fn get_item_as(
        &self,
        spec: &ResourceSpec,
        input: &ActionInput<'_, S::Scope>,
        output: Output,
    ) -> ActionResult<Value> {
        let record = self.get_item(spec, input).await?;
        match output {
            Output::Native => to_json(&record),
            Output::JsonApi => {
                let def = self.model_for(spec)?;
                to_json(&json_api::single(&|name: &str| self.store.model(name), def, &record))
            }
        }
    }

    /// `get_items` rendered as `output`.
    pub async fn get_items_as(
        &self,
        spec: &ResourceSpec,
        input: &ActionInput<'_, S::Scope>,
        output: Output,
    ) -> ActionResult<Value> {
        let set = self.get_items(spec, input).await?;
        match output {
            Output::Native => to_json(&set),
            Output::JsonApi => {
                let def = self.model_for(spec)?;
                to_json(&json_api::collection(&|name: &str| self.store.model(name), def, &set))
            }
        }
    }

    /// Fetch every matching record, or one page of them. An empty set is not an error.
    pub async fn get_items(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>) -> ActionResult<RecordSet> {
        self.logged(async {
            let model = self.model_for(spec)?;
            let fields = self.resolve_fields(spec, input)?;
            authorize(input.auth_bundle.as_ref(), spec.auth.as_ref(), &fields)?;
            let query = FetchQuery {
                page: page_window(input.paginate.as_ref(), &self.settings),
                ..self.read_query(spec, input, &fields)
            };
            tracing::debug!(action = "getItems", model = %model.name, query = ?query, "executing");

            let scope = ActionScope::enter(&self.store, input.transacting).await?;
            let result = self
                .store
                .fetch_all(scope.handle(), &model.name, &query)
                .await
                .map_err(ActionError::third_party)
                .map(|mut set| {
                    for record in &mut set.records {
                        self.finish_record(input, record);
                    }
                    set
                });
            scope.release(&self.store, result).await
        })
        .await
    }

    /// Insert a record built from input fields and declared defaults.
    pub async fn create_item(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>) -> ActionResult<Record> {
        self.logged(async {
            let model = self.model_for(spec)?;
            let fields = self.resolve_fields(spec, input)?;
            authorize(input.auth_bundle.as_ref(), spec.auth.as_ref(), &fields)?;
            let data = create_data(spec.field_specs(), &fields);
            tracing::debug!(action = "createItem", model = %model.name, data = ?data, "executing");

            let scope = ActionScope::enter(&self.store, input.transacting).await?;
            let result = self
                .store
                .insert(scope.handle(), &model.name, &data)
                .await
                .map_err(ActionError::third_party);
            scope.finish(&self.store, result).await
        })
        .await
    }

    /// Update the record addressed by the lookup field; 404 when it does not exist.
    pub async fn update_item(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>) -> ActionResult<Record> {
        self.logged(async {
            let model = self.model_for(spec)?;
            let fields = self.resolve_fields(spec, input)?;
            let lookup = get_lookup_field_data(spec.field_specs(), &fields).ok_or(ActionError::LookupFieldNotProvided)?;

            let scope = ActionScope::enter(&self.store, input.transacting).await?;
            let result = async {
                let existing = self
                    .store
                    .fetch(scope.handle(), &model.name, &FetchQuery::where_eq(&lookup))
                    .await
                    .map_err(not_found(&spec.model_name))?;
                authorize(
                    input.auth_bundle.as_ref(),
                    spec.auth.as_ref(),
                    &merge_fields(&existing.attributes, &fields),
                )?;
                let data = update_data(spec.field_specs(), &fields);
                tracing::debug!(action = "updateItem", model = %model.name, lookup = ?lookup, data = ?data, "executing");
                self.store
                    .save(scope.handle(), &model.name, &existing, &data)
                    .await
                    .map_err(ActionError::third_party)
            }
            .await;
            scope.finish(&self.store, result).await
        })
        .await
    }

    /// Update the record addressed by the lookup field, or create it carrying that lookup value.
    pub async fn upsert_item(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>) -> ActionResult<Record> {
        self.logged(async {
            let model = self.model_for(spec)?;
            let fields = self.resolve_fields(spec, input)?;
            let lookup = get_lookup_field_data(spec.field_specs(), &fields).ok_or(ActionError::LookupFieldNotProvided)?;
            let data = upsert_data(spec.field_specs(), &fields);
            let bundle = input.auth_bundle.as_ref();

            let scope = ActionScope::enter(&self.store, input.transacting).await?;
            let result = async {
                match self
                    .store
                    .fetch(scope.handle(), &model.name, &FetchQuery::where_eq(&lookup))
                    .await
                {
                    Ok(existing) => {
                        authorize(bundle, spec.auth.as_ref(), &merge_fields(&existing.attributes, &fields))?;
                        tracing::debug!(action = "upsertItem", model = %model.name, data = ?data, "updating");
                        self.store
                            .save(scope.handle(), &model.name, &existing, &data)
                            .await
                            .map_err(ActionError::third_party)
                    }
                    Err(StoreError::EmptyResult) => {
                        authorize(bundle, spec.auth.as_ref(), &fields)?;
                        let seeded = merge_fields(&lookup, &data);
                        tracing::debug!(action = "upsertItem", model = %model.name, data = ?seeded, "creating");
                        self.store
                            .insert(scope.handle(), &model.name, &seeded)
                            .await
                            .map_err(ActionError::third_party)
                    }
                    Err(err) => Err(ActionError::third_party(err)),
                }
            }
            .await;
            scope.finish(&self.store, result).await
        })
        .await
    }

    /// Delete every record matching the provided fields. Returns the number of rows removed.
    pub async fn delete_item(&self, spec: &ResourceSpec, input: &ActionInput<'_, S::Scope>) -> ActionResult<u64> {
        self.logged(async {
            let model = self.model_for(spec)?;
            let fields = self.resolve_fields(spec, input)?;
            let bundle = input.auth_bundle.as_ref();

            let scope = ActionScope::enter(&self.store, input.transacting).await?;
            let result = async {
                match get_lookup_field_data(spec.field_specs(), &fields) {
                    Some(lookup) => {
                        let existing = self
                            .store
                            .fetch(scope.handle(), &model.name, &FetchQuery::where_eq(&lookup))
                            .await
                            .map_err(not_found(&spec.model_name))?;
                        authorize(bundle, spec.auth.as_ref(), &merge_fields(&existing.attributes, &fields))?;
                    }
                    None => authorize(bundle, spec.auth.as_ref(), &fields)?,
                }
                let predicates = build_predicates(spec.field_specs(), &fields);
                if predicates.is_empty() {
                    // Nothing addresses a row; never fall through to an unfiltered delete.
                    return Err(ActionError::ResourceNotFound(spec.model_name.clone()));
                }
                tracing::debug!(action = "deleteItem", model = %model.name, predicates = ?predicates, "executing");
                self.store
                    .destroy(scope.handle(), &model.name, &predicates)
                    .await
                    .map_err(not_found(&spec.model_name))
            }
            .await;
            scope.finish(&self.store, result).await
        })
        .await
    }
}
