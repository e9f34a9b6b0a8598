//! Call signaling over the document store.
//!
//! Every transition re-reads the record and validates against the state
//! machine before writing, so a concurrent terminal transition (callee
//! rejects while the caller cancels) is never clobbered by a blind write of
//! the target status.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use causerie_shared::{CallId, CallKind, CallStatus, CoreError, CoreResult, UserId};
use causerie_store::document::server_timestamp;
use causerie_store::schema::{collections, fields};
use causerie_store::watch::map_stream;
use causerie_store::{
    Call, Direction, DocumentStore, Fields, Query, Streamed, WatchRegistry,
};
use causerie_user::UserDirectory;

use crate::transitions::validate_transition;

pub struct CallEngine {
    store: Arc<dyn DocumentStore>,
    directory: Arc<UserDirectory>,
    watches: Arc<WatchRegistry>,
}

impl CallEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<UserDirectory>,
        watches: Arc<WatchRegistry>,
    ) -> Self {
        Self {
            store,
            directory,
            watches,
        }
    }

    /// Start ringing the target.
    ///
    /// The presence check is advisory: it fails fast with
    /// [`CoreError::TargetUnavailable`] when the target is known offline,
    /// but a caller that wants to ring anyway uses
    /// [`Self::initiate_call_unchecked`].  An unreadable presence record
    /// does not block the call.
    pub async fn initiate_call(
        &self,
        caller: &UserId,
        callee: &UserId,
        kind: CallKind,
    ) -> CoreResult<CallId> {
        match self.directory.get_by_id(callee).await {
            Ok(Some(user)) if !user.is_online => {
                return Err(CoreError::TargetUnavailable(callee.clone()));
            }
            Ok(Some(_)) => {}
            Ok(None) => return Err(CoreError::NotFound(format!("user {callee}"))),
            Err(err) => {
                warn!(callee = %callee, error = %err, "presence unreadable, ringing anyway");
            }
        }
        self.initiate_call_unchecked(caller, callee, kind).await
    }

    /// Start ringing without consulting presence.
    pub async fn initiate_call_unchecked(
        &self,
        caller: &UserId,
        callee: &UserId,
        kind: CallKind,
    ) -> CoreResult<CallId> {
        if caller == callee {
            return Err(CoreError::Validation("cannot call yourself".into()));
        }

        let mut record = Fields::new();
        record.insert(fields::CALLER_ID.to_string(), json!(caller.as_str()));
        record.insert(fields::CALLEE_ID.to_string(), json!(callee.as_str()));
        record.insert(fields::CALL_TYPE.to_string(), json!(kind.as_str()));
        record.insert(
            fields::STATUS.to_string(),
            json!(CallStatus::Ringing.as_str()),
        );
        record.insert(fields::STARTED_AT.to_string(), server_timestamp());

        let id = self.store.create(collections::CALLS, record).await?;
        info!(call = %id, caller = %caller, callee = %callee, kind = %kind.as_str(), "call ringing");
        Ok(CallId::new(id))
    }

    /// Valid only from `Ringing`.  The returned record carries the session
    /// parameters both parties need to join the media channel.
    pub async fn answer_call(&self, call_id: &CallId) -> CoreResult<Call> {
        self.transition(call_id, CallStatus::Accepted).await
    }

    /// Valid only from `Ringing`.
    pub async fn reject_call(&self, call_id: &CallId) -> CoreResult<Call> {
        self.transition(call_id, CallStatus::Rejected).await
    }

    /// Valid from `Ringing` (caller cancels) or `Accepted`; callable by
    /// either participant.
    pub async fn end_call(&self, call_id: &CallId) -> CoreResult<Call> {
        self.transition(call_id, CallStatus::Ended).await
    }

    async fn transition(&self, call_id: &CallId, to: CallStatus) -> CoreResult<Call> {
        let doc = self
            .store
            .get(collections::CALLS, call_id.as_str())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("call {call_id}")))?;
        let call = Call::from_document(&doc)?;

        // Validation against the freshly read state; on failure the record
        // stays untouched.
        validate_transition(call.status, to)?;

        let mut update = Fields::new();
        update.insert(fields::STATUS.to_string(), json!(to.as_str()));
        if to == CallStatus::Ended {
            update.insert(fields::ENDED_AT.to_string(), server_timestamp());
        }
        self.store
            .update(collections::CALLS, call_id.as_str(), update)
            .await?;

        let doc = self
            .store
            .get(collections::CALLS, call_id.as_str())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("call {call_id}")))?;
        let call = Call::from_document(&doc)?;
        debug!(call = %call_id, status = %call.status, "call transitioned");
        Ok(call)
    }

    fn incoming_query(user: &UserId) -> Query {
        Query::collection(collections::CALLS)
            .filter_eq(fields::CALLEE_ID, user.as_str())
            .filter_eq(fields::STATUS, CallStatus::Ringing.as_str())
            .order_by(fields::STARTED_AT, Direction::Descending)
            .limit(1)
    }

    /// Live stream of the newest call ringing for the user, `None` while
    /// there is none.
    pub fn listen_for_incoming_calls(&self, user: &UserId) -> Streamed<Option<Call>> {
        map_stream(self.watches.subscribe(Self::incoming_query(user)), |docs| {
            docs.first()
                .map(Call::from_document)
                .transpose()
                .map_err(CoreError::from)
        })
    }

    /// Point-in-time equivalent of [`Self::listen_for_incoming_calls`], for
    /// state restoration after a process relaunch.
    pub async fn get_incoming_call(&self, user: &UserId) -> CoreResult<Option<Call>> {
        let docs = self.store.fetch(&Self::incoming_query(user)).await?;
        docs.first()
            .map(Call::from_document)
            .transpose()
            .map_err(CoreError::from)
    }

    /// Live status of one call, for the active call screen.
    pub fn listen_to_call_status(&self, call_id: &CallId) -> Streamed<Option<Call>> {
        let query = Query::doc(collections::CALLS, call_id.as_str());
        map_stream(self.watches.subscribe(query), |docs| {
            docs.first()
                .map(Call::from_document)
                .transpose()
                .map_err(CoreError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::AuthIdentity;
    use causerie_store::{MemoryStore, MemoryUploader};

    async fn harness() -> (Arc<MemoryStore>, Arc<UserDirectory>, CallEngine) {
        let store = Arc::new(MemoryStore::new());
        let watches = Arc::new(WatchRegistry::new(store.clone()));
        let directory = Arc::new(UserDirectory::new(
            store.clone(),
            Arc::new(MemoryUploader::new()),
            watches.clone(),
        ));
        for uid in ["u1", "u2"] {
            directory.sign_in(&AuthIdentity::new(uid)).await.unwrap();
        }
        let engine = CallEngine::new(store.clone(), directory.clone(), watches);
        (store, directory, engine)
    }

    #[tokio::test]
    async fn answer_accepts_a_ringing_call() {
        let (_, directory, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        directory.set_online(&u2).await.unwrap();

        let call_id = engine
            .initiate_call(&u1, &u2, CallKind::Audio)
            .await
            .unwrap();
        let call = engine.answer_call(&call_id).await.unwrap();
        assert_eq!(call.status, CallStatus::Accepted);
        assert_eq!(call.participants(), [&u1, &u2]);

        let ended = engine.end_call(&call_id).await.unwrap();
        assert_eq!(ended.status, CallStatus::Ended);
        assert!(ended.ended_at.is_some());
    }

    #[tokio::test]
    async fn reject_is_terminal() {
        let (_, directory, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        directory.set_online(&u2).await.unwrap();

        let call_id = engine
            .initiate_call(&u1, &u2, CallKind::Video)
            .await
            .unwrap();
        let call = engine.reject_call(&call_id).await.unwrap();
        assert_eq!(call.status, CallStatus::Rejected);

        let err = engine.answer_call(&call_id).await.unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidCallTransition {
                from: CallStatus::Rejected,
                to: CallStatus::Accepted,
            }
        );
    }

    #[tokio::test]
    async fn answering_an_ended_call_leaves_it_ended() {
        let (_, directory, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        directory.set_online(&u2).await.unwrap();

        let call_id = engine
            .initiate_call(&u1, &u2, CallKind::Audio)
            .await
            .unwrap();
        // Caller cancels before the answer.
        engine.end_call(&call_id).await.unwrap();

        let err = engine.answer_call(&call_id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidCallTransition { .. }));

        let current = engine.get_incoming_call(&u2).await.unwrap();
        assert!(current.is_none());
    }

    #[tokio::test]
    async fn offline_target_is_reported_before_ringing() {
        let (store, _, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");

        let err = engine
            .initiate_call(&u1, &u2, CallKind::Audio)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::TargetUnavailable(u2.clone()));
        // Soft check: nothing was written.
        assert!(store
            .fetch(&Query::collection(collections::CALLS))
            .await
            .unwrap()
            .is_empty());

        // The caller may decide to ring anyway.
        let call_id = engine
            .initiate_call_unchecked(&u1, &u2, CallKind::Audio)
            .await
            .unwrap();
        assert!(engine.get_incoming_call(&u2).await.unwrap().is_some());
        engine.end_call(&call_id).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_callee_is_not_found() {
        let (_, _, engine) = harness().await;
        let err = engine
            .initiate_call(&UserId::new("u1"), &UserId::new("ghost"), CallKind::Audio)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn incoming_stream_tracks_ring_and_answer() {
        let (_, directory, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        directory.set_online(&u2).await.unwrap();

        let mut incoming = engine.listen_for_incoming_calls(&u2);
        assert!(incoming.next_ready().await.unwrap().is_none());

        let call_id = engine
            .initiate_call(&u1, &u2, CallKind::Audio)
            .await
            .unwrap();
        let ringing = incoming.next_ready().await.unwrap().unwrap();
        assert_eq!(ringing.id, call_id);
        assert_eq!(ringing.status, CallStatus::Ringing);

        engine.answer_call(&call_id).await.unwrap();
        assert!(incoming.next_ready().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_stream_follows_the_record() {
        let (_, directory, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        directory.set_online(&u2).await.unwrap();

        let call_id = engine
            .initiate_call(&u1, &u2, CallKind::Video)
            .await
            .unwrap();
        let mut status = engine.listen_to_call_status(&call_id);
        assert_eq!(
            status.next_ready().await.unwrap().unwrap().status,
            CallStatus::Ringing
        );

        engine.answer_call(&call_id).await.unwrap();
        assert_eq!(
            status.next_ready().await.unwrap().unwrap().status,
            CallStatus::Accepted
        );

        engine.end_call(&call_id).await.unwrap();
        assert_eq!(
            status.next_ready().await.unwrap().unwrap().status,
            CallStatus::Ended
        );
    }

    #[tokio::test]
    async fn self_call_is_rejected() {
        let (_, _, engine) = harness().await;
        let u1 = UserId::new("u1");
        let err = engine
            .initiate_call_unchecked(&u1, &u1, CallKind::Audio)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
