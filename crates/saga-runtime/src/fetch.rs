//! Ready-made model for a request lifecycle.
//!
//! ```text
//! FETCH_REQUESTED ─▶ FETCH_IN_PROGRESS ─▶ api(args) ─┬─▶ FETCH_SUCCEEDED { data }
//!                                                     └─▶ FETCH_FAILED { error }
//! ```
//!
//! The model runs standalone or mounts as a plugin:
//!
//! ```ignore
//! let runtime = Runtime::start(fetch_model(|args| async move { api.get(args).await }))?;
//! runtime.dispatch(fetch::start(json!("user-1")));
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use saga_core::{Action, EffectError, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Model;

pub const FETCH_REQUESTED: &str = "FETCH_REQUESTED";
pub const FETCH_IN_PROGRESS: &str = "FETCH_IN_PROGRESS";
pub const FETCH_SUCCEEDED: &str = "FETCH_SUCCEEDED";
pub const FETCH_FAILED: &str = "FETCH_FAILED";

/// Typed view of the fetch state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchState {
    pub loading: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl FetchState {
    /// Read the fields from a snapshot (or a plugin slice).
    pub fn from_state(state: &State) -> Result<Self, serde_json::Error> {
        state.to_record()
    }
}

/// The action that starts a request. `args` is handed to the api verbatim.
pub fn start(args: impl Into<Value>) -> Action {
    Action::new(FETCH_REQUESTED).with("args", args)
}

/// Build a model that drives `api` through the request lifecycle.
pub fn fetch_model<F, Fut, E>(api: F) -> Model
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let api = Arc::new(api);
    let initial = State::new()
        .with("loading", false)
        .with("data", Value::Null)
        .with("error", Value::Null);

    Model::new(initial)
        .reducer(FETCH_SUCCEEDED, |_, action| {
            State::new()
                .with("loading", false)
                .with("data", action.get("data").cloned().unwrap_or(Value::Null))
                .with("error", Value::Null)
        })
        .reducer(FETCH_FAILED, |_, action| {
            State::new()
                .with("loading", false)
                .with("data", Value::Null)
                .with("error", action.get("error").cloned().unwrap_or(Value::Null))
        })
        .reducer(FETCH_IN_PROGRESS, |state, _| state.with("loading", true))
        .effect(FETCH_REQUESTED, move |action, ctx| {
            let api = api.clone();
            async move {
                ctx.dispatch(Action::new(FETCH_IN_PROGRESS)).await?;

                let args = action.get("args").cloned().unwrap_or(Value::Null);
                match ctx.invoke(api(args)).await {
                    Ok(data) => {
                        ctx.dispatch(Action::new(FETCH_SUCCEEDED).with("data", data))
                            .await
                    }
                    Err(EffectError::Invoke(message)) => {
                        ctx.dispatch(Action::new(FETCH_FAILED).with("error", message))
                            .await
                    }
                    Err(other) => Err(other),
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use mockall::automock;
    use mockall::predicate::eq;
    use serde_json::json;

    use super::*;
    use crate::plugin::Plugin;
    use crate::runtime::Runtime;

    #[automock]
    trait UserApi {
        fn fetch_user(&self, id: String) -> Result<Value, String>;
    }

    fn user_model(api: MockUserApi) -> Model {
        let api = Arc::new(api);
        fetch_model(move |args: Value| {
            let api = api.clone();
            async move { api.fetch_user(args.as_str().unwrap_or_default().to_string()) }
        })
    }

    fn history(actions: &mut crate::channel::ActionReceiver) -> String {
        actions
            .drain()
            .iter()
            .map(|a| {
                let loading = a.state.get_as::<bool>("loading").unwrap_or_default();
                format!("{} loading={}", a.action.kind(), loading)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    #[test]
    fn test_start_action() {
        let action = start(json!(["user", 1]));
        assert!(action.is(FETCH_REQUESTED));
        assert_eq!(action.get("args"), Some(&json!(["user", 1])));
    }

    #[test]
    fn test_initial_state_shape() {
        let model = fetch_model(|_| async { Ok::<_, String>(Value::Null) });
        let state = FetchState::from_state(model.state()).unwrap();
        assert_eq!(state, FetchState::default());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mut api = MockUserApi::new();
        api.expect_fetch_user()
            .with(eq("ada".to_string()))
            .times(1)
            .returning(|id| Ok(json!({ "id": id, "name": "Ada" })));
        let runtime = Runtime::start(user_model(api)).unwrap();
        let mut actions = runtime.subscribe_actions();

        assert!(runtime.dispatcher().dispatch_settled(start("ada")).await);

        insta::assert_snapshot!(
            history(&mut actions),
            @"FETCH_REQUESTED loading=false | FETCH_IN_PROGRESS loading=true | FETCH_SUCCEEDED loading=false"
        );
        assert_eq!(
            FetchState::from_state(&runtime.state()).unwrap(),
            FetchState {
                loading: false,
                data: json!({ "id": "ada", "name": "Ada" }),
                error: None,
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_is_stored() {
        let mut api = MockUserApi::new();
        api.expect_fetch_user()
            .times(1)
            .returning(|_| Err("user not found".to_string()));
        let runtime = Runtime::start(user_model(api)).unwrap();
        let mut reports = runtime.subscribe_routines();

        assert!(runtime.dispatcher().dispatch_settled(start("nobody")).await);

        let state = FetchState::from_state(&runtime.state()).unwrap();
        assert!(!state.loading);
        assert_eq!(state.data, Value::Null);
        assert_eq!(state.error.as_deref(), Some("user not found"));

        // The routine handled the failure itself
        let report = reports.try_recv().unwrap();
        assert_eq!(report.outcome, crate::scheduler::RoutineOutcome::Completed);
    }

    #[tokio::test]
    async fn test_fetch_mounted_as_plugin() {
        let mut api = MockUserApi::new();
        api.expect_fetch_user()
            .with(eq("ada".to_string()))
            .returning(|_| Ok(json!("Ada")));
        let host = Model::new(State::new().with("title", "profile"))
            .plugin(Plugin::new("user", user_model(api)));
        let runtime = Runtime::start(host).unwrap();

        assert!(runtime.dispatcher().dispatch_settled(start("ada")).await);

        let snapshot = runtime.state();
        assert_eq!(snapshot.get_as::<String>("title").as_deref(), Some("profile"));
        let user = FetchState::from_state(&snapshot.slice("user")).unwrap();
        assert_eq!(user.data, json!("Ada"));
        assert_eq!(user.error, None);
    }
}
