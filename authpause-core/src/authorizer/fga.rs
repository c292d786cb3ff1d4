use authpause_auth0::{FgaClient, TupleKey};

use super::AuthorizeError;
use crate::context::RequestContext;

type TupleBuilder<I> = Box<dyn Fn(&I, &RequestContext) -> TupleKey + Send + Sync>;

/// Relationship check run before a tool executes.
///
/// The tuple is built from the call's typed input and request context, e.g.
/// `user:<user_id>` `can_view` `doc:<id>`. A `false` answer denies the call.
pub struct FgaGate<I> {
    client: FgaClient,
    build_tuple: TupleBuilder<I>,
}

impl<I> FgaGate<I> {
    pub fn new(
        client: FgaClient,
        build_tuple: impl Fn(&I, &RequestContext) -> TupleKey + Send + Sync + 'static,
    ) -> Self {
        Self {
            client,
            build_tuple: Box::new(build_tuple),
        }
    }

    /// The tuple that would be checked for this input
    pub fn tuple_for(&self, input: &I, request: &RequestContext) -> TupleKey {
        (self.build_tuple)(input, request)
    }

    /// Check the tuple; `Ok(())` when allowed
    pub async fn check(&self, tuple: &TupleKey) -> Result<(), AuthorizeError> {
        if self.client.check(tuple).await? {
            return Ok(());
        }

        log::info!(
            "fga denied {} {} on {}",
            tuple.user,
            tuple.relation,
            tuple.object
        );
        Err(AuthorizeError::denied(format!(
            "{} is not allowed to {} {}",
            tuple.user, tuple.relation, tuple.object
        )))
    }
}
