use crm::CrmError;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("email is required")]
    MissingEmail,
    #[error("synchronizer is shutting down")]
    ShuttingDown,
    #[error("CRM call failed: {0}")]
    Upstream(#[from] CrmError),
}
