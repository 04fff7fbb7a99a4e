use deadpool_diesel::postgres::Pool;

use crate::errors::DatabaseError;

/// Extension trait over the deadpool-diesel pool that runs a blocking diesel
/// closure and folds every failure layer into [`DatabaseError`] with the
/// operation name attached for logging.
pub trait WalletdPool {
    fn interact_with_context<F, T, E>(
        &self,
        operation: String,
        f: F,
    ) -> impl std::future::Future<Output = Result<T, DatabaseError>> + Send
    where
        F: FnOnce(&mut diesel::PgConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<DatabaseError> + Send + 'static;
}

impl WalletdPool for Pool {
    async fn interact_with_context<F, T, E>(
        &self,
        operation: String,
        f: F,
    ) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut diesel::PgConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<DatabaseError> + Send + 'static,
    {
        let conn = self.get().await.map_err(|e| {
            tracing::error!(operation = %operation, error = %e, "failed to check out connection");
            DatabaseError::Pool {
                operation: operation.clone(),
                message: e.to_string(),
            }
        })?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| DatabaseError::Interact {
                operation: operation.clone(),
                message: e.to_string(),
            })?
            .map_err(|e| {
                let err: DatabaseError = e.into();
                let err = err.with_operation(&operation);
                if !err.is_not_found() {
                    tracing::error!(operation = %operation, error = %err, "database query failed");
                }
                err
            })
    }
}
