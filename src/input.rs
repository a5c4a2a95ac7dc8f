//! Per-call runtime arguments matched against a resource spec.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Resolved identity claims of the caller. Claim values are scalars or lists.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthBundle {
    pub claims: Map<String, Value>,
}

impl AuthBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

impl From<Map<String, Value>> for AuthBundle {
    fn from(claims: Map<String, Value>) -> Self {
        AuthBundle { claims }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginate {
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Paginate {
    pub fn new(skip: u64, limit: u64) -> Self {
        Paginate {
            skip: Some(skip),
            limit: Some(limit),
        }
    }
}

/// Input of a single-resource action. `transacting` joins a caller-owned scope.
pub struct ActionInput<'a, Tx> {
    pub fields: Map<String, Value>,
    pub transacting: Option<&'a Tx>,
    pub auth_bundle: Option<AuthBundle>,
    pub relations: Option<Vec<String>>,
    /// `"association:attribute"` tokens.
    pub load_direct: Option<Vec<String>>,
    pub paginate: Option<Paginate>,
    pub order_by: Option<String>,
    pub column_set: Option<String>,
}

impl<Tx> Default for ActionInput<'_, Tx> {
    fn default() -> Self {
        ActionInput {
            fields: Map::new(),
            transacting: None,
            auth_bundle: None,
            relations: None,
            load_direct: None,
            paginate: None,
            order_by: None,
            column_set: None,
        }
    }
}

impl<Tx> Clone for ActionInput<'_, Tx> {
    fn clone(&self) -> Self {
        self.scoped_opt(self.transacting)
    }
}

impl<Tx> std::fmt::Debug for ActionInput<'_, Tx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionInput")
            .field("fields", &self.fields)
            .field("transacting", &self.transacting.is_some())
            .field("auth_bundle", &self.auth_bundle)
            .field("relations", &self.relations)
            .field("load_direct", &self.load_direct)
            .field("paginate", &self.paginate)
            .field("order_by", &self.order_by)
            .field("column_set", &self.column_set)
            .finish()
    }
}

impl<'a, Tx> ActionInput<'a, Tx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields = fields;
        self
    }

    pub fn transacting(mut self, scope: &'a Tx) -> Self {
        self.transacting = Some(scope);
        self
    }

    pub fn auth_bundle(mut self, bundle: AuthBundle) -> Self {
        self.auth_bundle = Some(bundle);
        self
    }

    pub fn relations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn load_direct<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load_direct = Some(tokens.into_iter().map(Into::into).collect());
        self
    }

    pub fn paginate(mut self, skip: u64, limit: u64) -> Self {
        self.paginate = Some(Paginate::new(skip, limit));
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn column_set(mut self, name: impl Into<String>) -> Self {
        self.column_set = Some(name.into());
        self
    }

    /// Copy of this input bound to another (shorter-lived) scope.
    pub fn scoped<'b>(&self, scope: &'b Tx) -> ActionInput<'b, Tx> {
        self.scoped_opt(Some(scope))
    }

    fn scoped_opt<'b>(&self, scope: Option<&'b Tx>) -> ActionInput<'b, Tx> {
        ActionInput {
            fields: self.fields.clone(),
            transacting: scope,
            auth_bundle: self.auth_bundle.clone(),
            relations: self.relations.clone(),
            load_direct: self.load_direct.clone(),
            paginate: self.paginate,
            order_by: self.order_by.clone(),
            column_set: self.column_set.clone(),
        }
    }
}

/// Input of a composite action: one input per participant plus an optional shared scope.
pub struct AssociationInput<'a, Tx> {
    pub main: Option<ActionInput<'a, Tx>>,
    pub association: Option<ActionInput<'a, Tx>>,
    pub transacting: Option<&'a Tx>,
}

impl<'a, Tx> AssociationInput<'a, Tx> {
    pub fn new(main: ActionInput<'a, Tx>, association: ActionInput<'a, Tx>) -> Self {
        AssociationInput {
            main: Some(main),
            association: Some(association),
            transacting: None,
        }
    }

    pub fn transacting(mut self, scope: &'a Tx) -> Self {
        self.transacting = Some(scope);
        self
    }
}
