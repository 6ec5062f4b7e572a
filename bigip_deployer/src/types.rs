use bigip_rest::ConfigTree;

/// Directives riding along with a deploy request.
///
/// The worker consults these per device; none of them changes what the
/// diff engine computes, only where and around which partition lifecycle
/// it is applied.
#[derive(Debug, Clone, Default)]
pub struct DeployContext {
    /// Act only on the device with this management url.
    pub specified_bigip: Option<String>,
    /// Ensure the partition exists before applying the configs.
    pub create_partition: bool,
    /// Tear the partition down after applying the configs.
    pub delete_partition: bool,
    /// Correlation id stamped into every log record for this request.
    pub request_id: Option<String>,
}

impl DeployContext {
    /// Context tagged with a fresh correlation id.
    pub fn tagged() -> Self {
        DeployContext {
            request_id: Some(uuid::Uuid::new_v4().to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn log_tag(&self) -> String {
        match &self.request_id {
            Some(id) => format!("[{}] ", id),
            None => String::new(),
        }
    }
}

/// One unit of reconciliation work: move `partition` from the `from` tree
/// to the `to` tree. Either side may be absent for pure create / delete.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub meta: String,
    pub from: Option<ConfigTree>,
    pub to: Option<ConfigTree>,
    pub partition: String,
    pub context: DeployContext,
}

/// Outcome published to the done queue; the error aggregates every
/// device's failure so retriable markers survive to outer retry loops.
#[derive(Debug)]
pub struct DeployResponse {
    pub request: DeployRequest,
    pub status: crate::Result<()>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_contexts_get_unique_ids() {
        let a = DeployContext::tagged();
        let b = DeployContext::tagged();
        assert_ne!(a.request_id, b.request_id);
        assert!(a.log_tag().starts_with('['));
        assert_eq!(DeployContext::default().log_tag(), "");
    }
}
