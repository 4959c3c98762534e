//! Platform: every bridge in a configuration file, started together.

use tracing::info;

use rflink_core::error::{Error, Result};
use rflink_core::transport::Transport;
use rflink_core::types::DeviceId;

use crate::builder::GatewayBuilder;
use crate::config::{GatewayConfig, PlatformConfig};
use crate::device::DeviceSpec;
use crate::gateway::Gateway;

/// A running gateway and the devices registered on it.
pub struct Bridge {
    gateway: Gateway,
    devices: Vec<DeviceId>,
}

impl Bridge {
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Device ids in configuration order.
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }
}

/// All configured bridges, one controller each.
pub struct Platform {
    bridges: Vec<Bridge>,
}

impl Platform {
    /// Open every bridge's serial port and register its devices.
    ///
    /// The whole configuration is validated before any port is opened.
    pub async fn start(config: &PlatformConfig) -> Result<Self> {
        let plan = plan(config)?;
        let mut bridges = Vec::with_capacity(plan.len());
        for (gateway_config, specs) in plan {
            let gateway = GatewayBuilder::from_config(gateway_config).build().await?;
            bridges.push(start_bridge(gateway, specs).await?);
        }
        info!(bridges = bridges.len(), "platform started");
        Ok(Platform { bridges })
    }

    /// Like [`start`](Self::start), with one caller-provided transport per
    /// bridge in configuration order.
    pub async fn start_with_transports(
        config: &PlatformConfig,
        transports: Vec<Box<dyn Transport>>,
    ) -> Result<Self> {
        let plan = plan(config)?;
        if transports.len() != plan.len() {
            return Err(Error::InvalidParameter(format!(
                "{} transports for {} bridges",
                transports.len(),
                plan.len()
            )));
        }

        let mut bridges = Vec::with_capacity(plan.len());
        for ((gateway_config, specs), transport) in plan.into_iter().zip(transports) {
            let gateway = GatewayBuilder::from_config(gateway_config)
                .build_with_transport(transport)
                .await?;
            bridges.push(start_bridge(gateway, specs).await?);
        }
        info!(bridges = bridges.len(), "platform started");
        Ok(Platform { bridges })
    }

    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    /// Total number of registered devices across all bridges.
    pub fn device_count(&self) -> usize {
        self.bridges.iter().map(|b| b.devices.len()).sum()
    }

    /// Shut every gateway down, flushing queued commands and closing
    /// transports.
    pub async fn shutdown(self) -> Result<()> {
        for bridge in self.bridges {
            let mut transport = bridge.gateway.shutdown().await?;
            transport.close().await?;
        }
        Ok(())
    }
}

fn plan(config: &PlatformConfig) -> Result<Vec<(GatewayConfig, Vec<DeviceSpec>)>> {
    config.validate()?;
    let mut plan = Vec::with_capacity(config.bridges.len());
    for bridge in &config.bridges {
        plan.push((bridge.gateway_config(), bridge.device_specs()?));
    }
    Ok(plan)
}

async fn start_bridge(gateway: Gateway, specs: Vec<DeviceSpec>) -> Result<Bridge> {
    let mut devices = Vec::with_capacity(specs.len());
    for spec in specs {
        devices.push(gateway.register(spec).await?);
    }
    Ok(Bridge { gateway, devices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rflink_core::events::GatewayEvent;
    use rflink_core::types::SetValue;
    use rflink_test_harness::MockTransport;
    use std::time::Duration;

    const TWO_BRIDGES: &str = r#"{
        "bridges": [
            {
                "serialport": "/dev/ttyACM0",
                "devices": [
                    {"name": "Lamp", "type": "Lightbulb", "protocol": "NewKaku",
                     "address": "00cac142", "channels": [1, 2]}
                ]
            },
            {
                "serialport": "/dev/ttyACM1",
                "delay": 50,
                "repeat": 3,
                "devices": [
                    {"name": "Fan", "type": "Switch", "protocol": "Kaku",
                     "address": "41", "channels": [1]},
                    {"name": "Remote", "type": "StatelessProgrammableSwitch",
                     "protocol": "Kaku", "address": "42", "channels": ["all"]}
                ]
            }
        ]
    }"#;

    fn mocks(n: usize) -> (Vec<Box<dyn Transport>>, Vec<rflink_test_harness::MockHandle>) {
        let mocks: Vec<MockTransport> = (0..n).map(|_| MockTransport::new()).collect();
        let handles = mocks.iter().map(MockTransport::handle).collect();
        let boxed = mocks
            .into_iter()
            .map(|m| Box::new(m) as Box<dyn Transport>)
            .collect();
        (boxed, handles)
    }

    #[tokio::test]
    async fn starts_every_bridge() {
        let config = PlatformConfig::from_json_str(TWO_BRIDGES).unwrap();
        let (transports, _) = mocks(2);
        let platform = Platform::start_with_transports(&config, transports)
            .await
            .unwrap();

        assert_eq!(platform.bridges().len(), 2);
        assert_eq!(platform.device_count(), 3);
        assert_eq!(platform.bridges()[1].gateway().config().repeat, 3);
        assert_eq!(
            platform.bridges()[1].gateway().config().delay,
            Duration::from_millis(50)
        );
        platform.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn commands_use_their_bridge() {
        let config = PlatformConfig::from_json_str(TWO_BRIDGES).unwrap();
        let (transports, handles) = mocks(2);
        let platform = Platform::start_with_transports(&config, transports)
            .await
            .unwrap();

        let bridge = &platform.bridges()[1];
        bridge
            .gateway()
            .set_on(bridge.devices()[0], 0, SetValue::Requested(true))
            .await
            .unwrap();
        platform.shutdown().await.unwrap();

        assert!(handles[0].sent().is_empty());
        assert_eq!(
            handles[1].sent_strings(),
            vec!["10;Kaku;41;1;ON;\n"; 3]
        );
    }

    #[tokio::test]
    async fn shutdown_stops_every_gateway() {
        let config = PlatformConfig::from_json_str(TWO_BRIDGES).unwrap();
        let (transports, handles) = mocks(2);
        let platform = Platform::start_with_transports(&config, transports)
            .await
            .unwrap();
        let mut events = platform.bridges()[0].gateway().subscribe();

        platform.shutdown().await.unwrap();
        assert!(handles.iter().all(|h| h.sent().is_empty()));
        assert!(matches!(events.recv().await, Ok(GatewayEvent::Disconnected)));
    }

    #[tokio::test]
    async fn transport_count_must_match() {
        let config = PlatformConfig::from_json_str(TWO_BRIDGES).unwrap();
        let (transports, _) = mocks(1);
        let result = Platform::start_with_transports(&config, transports).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn invalid_device_fails_before_opening_ports() {
        let config: PlatformConfig = serde_json::from_str(
            r#"{"bridges": [{"serialport": "/dev/does-not-exist-rflink", "devices": [
                {"name": "X", "type": "Dimmer", "protocol": "P", "address": "1", "channels": [1]}
            ]}]}"#,
        )
        .unwrap();
        let result = Platform::start(&config).await;
        assert!(matches!(result, Err(Error::UnknownCapability(_))));
    }
}
