//! Architecture Verification Suite
//!
//! Everything shared between concurrent reconciles must be thread-safe, and
//! both entity kinds must satisfy the capability the phase driver needs.

#[cfg(test)]
mod architecture_tests {
    use lifecycle_operator::lifecycle::{ApplicationVersion, LifecycleEntity, WorkloadInstance};
    use lifecycle_operator::store::Store;

    // 1. Shared services must be Send + Sync
    #[test]
    fn test_shared_services_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<lifecycle_operator::telemetry::SpanBinder>();
        assert_send_sync::<lifecycle_operator::telemetry::BroadcastRecorder>();
        assert_send_sync::<lifecycle_operator::telemetry::KeptnMeters>();
        assert_send_sync::<lifecycle_operator::reconciler::PhaseDriver>();
        assert_send_sync::<lifecycle_operator::reconciler::AppVersionReconciler>();
        assert_send_sync::<lifecycle_operator::reconciler::WorkloadInstanceReconciler>();
        assert_send_sync::<lifecycle_operator::Scheduler>();
    }

    // 2. Both stores serve both entity kinds
    #[test]
    fn test_stores_serve_both_kinds() {
        fn assert_store<S: Store<ApplicationVersion> + Store<WorkloadInstance>>() {}

        assert_store::<lifecycle_operator::store::MemoryStore>();
        assert_store::<lifecycle_operator::store::SqliteStore>();
    }

    // 3. Both entity kinds plug into the generic driver
    #[test]
    fn test_entities_implement_capability() {
        fn assert_entity<E: LifecycleEntity>() -> usize {
            E::phases().len()
        }

        assert_eq!(assert_entity::<ApplicationVersion>(), 5);
        assert_eq!(assert_entity::<WorkloadInstance>(), 5);
    }

    // 4. Errors cross task boundaries
    #[test]
    fn test_errors_are_thread_safe() {
        fn assert_error<T: std::error::Error + Send + Sync + 'static>() {}

        assert_error::<lifecycle_operator::store::StoreError>();
        assert_error::<lifecycle_operator::reconciler::ReconcileError>();
    }
}
