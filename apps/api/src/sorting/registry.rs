use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::record::Variety;

#[derive(Debug, Default)]
struct RegistryState {
    variety: Option<Variety>,
    camera_ip: Option<IpAddr>,
}

/// Process-lifetime device settings: the operator's selected variety and the
/// camera's last announced address. Both reset when the process restarts.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

impl DeviceRegistry {
    /// The selected variety, or Carabao when none has been chosen.
    pub async fn selected_variety(&self) -> Variety {
        self.inner.read().await.variety.unwrap_or_default()
    }

    pub async fn set_variety(&self, variety: Variety) {
        self.inner.write().await.variety = Some(variety);
    }

    pub async fn camera_ip(&self) -> Option<IpAddr> {
        self.inner.read().await.camera_ip
    }

    pub async fn set_camera_ip(&self, ip: IpAddr) {
        self.inner.write().await.camera_ip = Some(ip);
    }
}
