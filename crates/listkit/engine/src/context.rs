//! Request context and hook actions

use std::fmt;
use std::sync::Arc;

use listkit_access::{AccessControl, DeclaredAccessControl, SudoAccessControl};
use listkit_types::{AuthedItem, ItemId, QueryArgs, QueryMeta};

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::query::{ItemResponse, QueryResponse};

/// Per-request state: who is calling and which access collaborator judges
/// them.
#[derive(Clone)]
pub struct RequestContext {
    authentication: Option<AuthedItem>,
    access: Arc<dyn AccessControl>,
}

impl RequestContext {
    pub fn new(authentication: Option<AuthedItem>, access: Arc<dyn AccessControl>) -> Self {
        Self {
            authentication,
            access,
        }
    }

    /// Context evaluating declared rules with the given fallbacks.
    pub fn declared(
        authentication: Option<AuthedItem>,
        defaults: listkit_access::AccessDefaults,
    ) -> Self {
        Self::new(authentication, Arc::new(DeclaredAccessControl::new(defaults)))
    }

    pub fn authentication(&self) -> Option<&AuthedItem> {
        self.authentication.as_ref()
    }

    /// Log-safe caller identity.
    pub fn identity(&self) -> Option<String> {
        self.authentication.as_ref().map(AuthedItem::identity)
    }

    pub fn access(&self) -> &dyn AccessControl {
        self.access.as_ref()
    }

    /// Same caller, every access check bypassed.
    pub fn sudo(&self) -> Self {
        Self {
            authentication: self.authentication.clone(),
            access: Arc::new(SudoAccessControl),
        }
    }

    pub fn is_sudo(&self) -> bool {
        self.access.skips_access_control()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("authentication", &self.identity())
            .field("access", &self.access)
            .finish()
    }
}

/// Read operations available to hooks, bound to the caller's context.
#[derive(Debug, Clone)]
pub struct Actions {
    engine: Engine,
    context: RequestContext,
}

impl Actions {
    pub fn new(engine: Engine, context: RequestContext) -> Self {
        Self { engine, context }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// The same actions with access checks bypassed.
    pub fn sudo(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            context: self.context.sudo(),
        }
    }

    pub async fn query(&self, list_key: &str, args: QueryArgs) -> EngineResult<QueryResponse> {
        self.engine.list_query(list_key, args, &self.context).await
    }

    pub async fn query_meta(&self, list_key: &str, args: QueryArgs) -> EngineResult<QueryMeta> {
        self.engine.list_query_meta(list_key, args, &self.context).await
    }

    pub async fn find_by_id(&self, list_key: &str, id: &ItemId) -> EngineResult<ItemResponse> {
        self.engine.item_query(list_key, id, &self.context).await
    }
}
