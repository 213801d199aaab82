// Copyright (c) 2025 - Cowboy AI, Inc.
//! Multi-asset status changes
//!
//! - [`best_effort`]: attempt every name once, log failures, never abort
//! - [`atomic`]: stop at the first failure and revert everything attempted
//!   so far, the failing name included

use std::future::Future;

use tracing::warn;

use crate::errors::ManagerResult;

/// Apply `change` to every name, logging and skipping failures
pub async fn best_effort<F, Fut>(names: &[String], mut change: F)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ManagerResult<()>>,
{
    for name in names {
        if let Err(e) = change(name.clone()).await {
            warn!(node = %name, error = %e, "status change failed, continuing");
        }
    }
}

/// Apply `change` to every name in order. When the change for the name at
/// index `i` fails, `revert` runs best-effort over `names[..=i]` and the
/// failing change's error is returned.
pub async fn atomic<F, Fut, R, RevertFut>(
    names: &[String],
    mut change: F,
    mut revert: R,
) -> ManagerResult<()>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ManagerResult<()>>,
    R: FnMut(String) -> RevertFut,
    RevertFut: Future<Output = ManagerResult<()>>,
{
    for (index, name) in names.iter().enumerate() {
        if let Err(e) = change(name.clone()).await {
            warn!(
                node = %name,
                error = %e,
                reverted = index + 1,
                "status change failed, reverting batch"
            );
            best_effort(&names[..=index], &mut revert).await;
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ManagerError;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Records calls; fails for the names in `failing`
    fn recorder(
        log: Arc<Mutex<Vec<String>>>,
        failing: Vec<String>,
    ) -> impl FnMut(String) -> futures::future::Ready<ManagerResult<()>> {
        move |name| {
            log.lock().unwrap().push(name.clone());
            if failing.contains(&name) {
                futures::future::ready(Err(ManagerError::UnknownNode(name)))
            } else {
                futures::future::ready(Ok(()))
            }
        }
    }

    #[tokio::test]
    async fn test_atomic_reverts_prefix_including_failure() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let reverted = Arc::new(Mutex::new(Vec::new()));

        let err = atomic(
            &names(&["a", "b", "c"]),
            recorder(applied.clone(), names(&["b"])),
            recorder(reverted.clone(), Vec::new()),
        )
        .await
        .unwrap_err();

        assert_eq!(err, ManagerError::UnknownNode("b".to_string()));
        assert_eq!(*applied.lock().unwrap(), names(&["a", "b"]));
        assert_eq!(*reverted.lock().unwrap(), names(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_atomic_revert_failures_are_not_escalated() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let reverted = Arc::new(Mutex::new(Vec::new()));

        let err = atomic(
            &names(&["a", "b", "c"]),
            recorder(applied.clone(), names(&["c"])),
            recorder(reverted.clone(), names(&["a"])),
        )
        .await
        .unwrap_err();

        assert_eq!(err, ManagerError::UnknownNode("c".to_string()));
        assert_eq!(*reverted.lock().unwrap(), names(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_atomic_success_never_reverts() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let reverted = Arc::new(Mutex::new(Vec::new()));

        atomic(
            &names(&["a", "b"]),
            recorder(applied.clone(), Vec::new()),
            recorder(reverted.clone(), Vec::new()),
        )
        .await
        .unwrap();

        assert_eq!(*applied.lock().unwrap(), names(&["a", "b"]));
        assert!(reverted.lock().unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_best_effort_attempts_every_name_once(
            outcomes in proptest::collection::vec(any::<bool>(), 0..20)
        ) {
            let all: Vec<String> = (0..outcomes.len()).map(|i| format!("node-{}", i)).collect();
            let failing: Vec<String> = all
                .iter()
                .zip(&outcomes)
                .filter(|(_, ok)| !**ok)
                .map(|(name, _)| name.clone())
                .collect();
            let attempted = Arc::new(Mutex::new(Vec::new()));

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(best_effort(&all, recorder(attempted.clone(), failing)));

            prop_assert_eq!(&*attempted.lock().unwrap(), &all);
        }

        #[test]
        fn prop_atomic_reverts_exactly_up_to_first_failure(
            outcomes in proptest::collection::vec(any::<bool>(), 1..20)
        ) {
            let all: Vec<String> = (0..outcomes.len()).map(|i| format!("node-{}", i)).collect();
            let failing: Vec<String> = all
                .iter()
                .zip(&outcomes)
                .filter(|(_, ok)| !**ok)
                .map(|(name, _)| name.clone())
                .collect();
            let applied = Arc::new(Mutex::new(Vec::new()));
            let reverted = Arc::new(Mutex::new(Vec::new()));

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = runtime.block_on(atomic(
                &all,
                recorder(applied.clone(), failing.clone()),
                recorder(reverted.clone(), Vec::new()),
            ));

            match outcomes.iter().position(|ok| !ok) {
                Some(first) => {
                    prop_assert_eq!(result, Err(ManagerError::UnknownNode(all[first].clone())));
                    prop_assert_eq!(&*applied.lock().unwrap(), &all[..=first].to_vec());
                    prop_assert_eq!(&*reverted.lock().unwrap(), &all[..=first].to_vec());
                }
                None => {
                    prop_assert_eq!(result, Ok(()));
                    prop_assert!(reverted.lock().unwrap().is_empty());
                }
            }
        }
    }
}
