//! Container discovery
//!
//! Lists running containers through the runtime control API and keeps
//! those whose image reference carries the workload marker.

use super::{RuntimeApi, TransportError};
use crate::models::ContainerRecord;
use serde::Deserialize;
use tracing::{debug, info, warn};

const CONTAINER_LIST_PATH: &str = "/containers/json";

/// Length of the short container id used as a fallback name
const SHORT_ID_LEN: usize = 12;

/// Container entry as returned by the listing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ListedContainer {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Image", default)]
    pub image: Option<String>,
}

/// List containers whose image contains `marker` (case-insensitive)
///
/// A non-200 response or an unparsable body yields an empty list. Only a
/// transport failure is returned as an error.
pub async fn list_target_containers(
    runtime: &dyn RuntimeApi,
    marker: &str,
) -> Result<Vec<ContainerRecord>, TransportError> {
    let response = runtime.get(CONTAINER_LIST_PATH).await?;

    if !response.is_ok() {
        warn!(status = response.status, "Container listing returned non-success status");
        return Ok(Vec::new());
    }

    let listed: Vec<ListedContainer> = match serde_json::from_slice(&response.body) {
        Ok(listed) => listed,
        Err(e) => {
            warn!(error = %e, "Failed to parse container listing");
            return Ok(Vec::new());
        }
    };

    let total = listed.len();
    let containers = filter_target_containers(listed, marker);

    info!(
        total = total,
        matched = containers.len(),
        marker = %marker,
        "Discovered target containers"
    );
    Ok(containers)
}

/// Keep listed containers whose image reference contains `marker`
///
/// Matching is a case-insensitive substring test. Entries without an
/// image are dropped.
pub fn filter_target_containers(
    listed: Vec<ListedContainer>,
    marker: &str,
) -> Vec<ContainerRecord> {
    let marker = marker.to_lowercase();

    listed
        .into_iter()
        .filter_map(|c| {
            let image = c.image?;
            if !image.to_lowercase().contains(&marker) {
                debug!(container_id = %c.id, image = %image, "Skipping non-target container");
                return None;
            }
            let display_name = container_display_name(&c.id, &c.names);
            Some(ContainerRecord {
                id: c.id,
                display_name,
                image_ref: image,
            })
        })
        .collect()
}

/// Display name for a container: first name without its leading `/`,
/// or the short id when no name is set
pub fn container_display_name(id: &str, names: &[String]) -> String {
    let name = names
        .first()
        .map(|n| n.trim_start_matches('/'))
        .unwrap_or_default();

    if name.is_empty() {
        id.chars().take(SHORT_ID_LEN).collect()
    } else {
        name.to_string()
    }
}
