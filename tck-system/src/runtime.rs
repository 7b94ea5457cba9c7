//! Harness assembly.
//!
//! [`TckRuntime`] is built once per run from a [`TckConfig`] and owns every
//! shared object: the tokio runtime, the canonicalizer, the harness callback
//! endpoint, the transport, the harness and system connectors, and the
//! clients of the configured mode. Pipelines, mocks and action contexts are
//! handed out by factory methods.
//!
//! ## Modes
//!
//! | | Local | Networked |
//! |---|---|---|
//! | System under test | embedded system connector | remote connector |
//! | Clients | `Local*` over the system connector | `Http*` over `reqwest` |
//! | Transport | loopback into the endpoints | HTTP |
//! | Mocks | scripted, on the blocking pool | no-op |

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tck_core::constants::TCK_PARTICIPANT_ID;
use tck_core::errors::TckError;
use tck_core::message::Canonicalizer;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::info;

use crate::actions::ActionContext;
use crate::client::{
    ConsumerNegotiationClient, ConsumerTransferProcessClient, HttpConsumerNegotiationClient,
    HttpConsumerTransferProcessClient, HttpProviderNegotiationClient,
    HttpMetadataClient, HttpProviderTransferProcessClient, LocalConsumerNegotiationClient,
    LocalConsumerTransferProcessClient, LocalMetadataClient, LocalProviderNegotiationClient,
    LocalProviderTransferProcessClient, MetadataClient, ProviderNegotiationClient,
    ProviderTransferProcessClient,
};
use crate::config::{
    TckConfig, CONNECTOR_HTTP_URL_KEY, NEGOTIATION_INITIATE_URL_KEY, TRANSFER_INITIATE_URL_KEY,
};
use crate::connector::Connector;
use crate::endpoint::CallbackEndpoint;
use crate::mock::{
    ConsumerNegotiationMock, ConsumerTransferProcessMock, LocalNegotiationMock,
    LocalTransferProcessMock, NoOpMock, ProviderNegotiationMock, ProviderTransferProcessMock,
};
use crate::pipeline::{
    AsyncPipeline, ConsumerNegotiationPipeline, ConsumerTransferPipeline, PipelineTiming,
    ProviderNegotiationPipeline, ProviderTransferPipeline,
};
use crate::server::{self, CallbackServer};
use crate::service::ConnectorService;
use crate::transport::{HttpTransport, LoopbackTransport, Transport};

/// Path under the callback address where the system connector listens in
/// local mode.
pub const SYSTEM_PATH: &str = "/system";

struct Clients {
    consumer_negotiation: Arc<dyn ConsumerNegotiationClient>,
    provider_negotiation: Arc<dyn ProviderNegotiationClient>,
    consumer_transfer: Arc<dyn ConsumerTransferProcessClient>,
    provider_transfer: Arc<dyn ProviderTransferProcessClient>,
    metadata: Arc<dyn MetadataClient>,
}

pub struct TckRuntime {
    config: TckConfig,
    runtime: Option<Runtime>,
    handle: Handle,
    canonicalizer: Arc<Canonicalizer>,
    endpoint: Arc<CallbackEndpoint>,
    system_endpoint: Arc<CallbackEndpoint>,
    transport: Arc<dyn Transport>,
    harness: Connector,
    system: Connector,
    clients: Clients,
    server: Mutex<Option<CallbackServer>>,
}

impl std::fmt::Debug for TckRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TckRuntime")
            .field("local", &self.config.local_connector)
            .field("callback_address", &self.endpoint.address())
            .field("harness", &self.harness)
            .field("system", &self.system)
            .finish()
    }
}

impl TckRuntime {
    /// Assembles a runtime for `config`, using HTTP when networked and the
    /// loopback transport in local mode.
    pub fn new(config: TckConfig) -> Result<Self, TckError> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("tck-worker")
            .max_blocking_threads(config.thread_pool)
            .build()
            .map_err(|e| TckError::Transport(format!("Failed to start runtime: {e}")))?;
        let handle = runtime.handle().clone();

        let canonicalizer = Arc::new(Canonicalizer::dsp()?);
        let endpoint = Arc::new(CallbackEndpoint::new(config.callback_address.clone()));
        let system_endpoint = Arc::new(CallbackEndpoint::new(format!(
            "{}{SYSTEM_PATH}",
            endpoint.address()
        )));
        let harness = Connector::new(canonicalizer.clone());
        let system = Connector::new(canonicalizer.clone());

        let transport: Arc<dyn Transport> = if config.local_connector {
            Arc::new(LoopbackTransport::new(vec![
                endpoint.clone(),
                system_endpoint.clone(),
            ]))
        } else {
            Arc::new(HttpTransport::new(
                handle.clone(),
                config.wait(),
                config.authorization_header.clone(),
            )?)
        };

        let clients = if config.local_connector {
            ConnectorService::new(system.clone(), canonicalizer.clone(), TCK_PARTICIPANT_ID)
                .register(&system_endpoint)?;
            Clients {
                consumer_negotiation: Arc::new(LocalConsumerNegotiationClient::new(system.clone())),
                provider_negotiation: Arc::new(LocalProviderNegotiationClient::new(system.clone())),
                consumer_transfer: Arc::new(LocalConsumerTransferProcessClient::new(system.clone())),
                provider_transfer: Arc::new(LocalProviderTransferProcessClient::new(system.clone())),
                metadata: Arc::new(LocalMetadataClient::new(system.clone())),
            }
        } else {
            let base_url = required(&config.connector_base_url, CONNECTOR_HTTP_URL_KEY)?;
            Clients {
                consumer_negotiation: Arc::new(HttpConsumerNegotiationClient::new(
                    transport.clone(),
                    canonicalizer.clone(),
                    required(&config.negotiation_initiate_url, NEGOTIATION_INITIATE_URL_KEY)?,
                    endpoint.address(),
                )),
                provider_negotiation: Arc::new(HttpProviderNegotiationClient::new(
                    transport.clone(),
                    canonicalizer.clone(),
                    base_url.clone(),
                )),
                consumer_transfer: Arc::new(HttpConsumerTransferProcessClient::new(
                    transport.clone(),
                    canonicalizer.clone(),
                    required(&config.transfer_initiate_url, TRANSFER_INITIATE_URL_KEY)?,
                    endpoint.address(),
                )),
                provider_transfer: Arc::new(HttpProviderTransferProcessClient::new(
                    transport.clone(),
                    canonicalizer.clone(),
                    base_url.clone(),
                )),
                metadata: Arc::new(HttpMetadataClient::new(transport.clone(), base_url)),
            }
        };

        info!(
            local = config.local_connector,
            callback_address = endpoint.address(),
            "TCK runtime assembled"
        );
        Ok(Self {
            config,
            runtime: Some(runtime),
            handle,
            canonicalizer,
            endpoint,
            system_endpoint,
            transport,
            harness,
            system,
            clients,
            server: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TckConfig {
        &self.config
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn canonicalizer(&self) -> &Arc<Canonicalizer> {
        &self.canonicalizer
    }

    /// Harness callback endpoint.
    pub fn endpoint(&self) -> &Arc<CallbackEndpoint> {
        &self.endpoint
    }

    /// Endpoint serving the system connector in local mode.
    pub fn system_endpoint(&self) -> &Arc<CallbackEndpoint> {
        &self.system_endpoint
    }

    /// Managers playing the counter-party of the system under test.
    pub fn harness_connector(&self) -> &Connector {
        &self.harness
    }

    /// Embedded reference connector.
    pub fn system_connector(&self) -> &Connector {
        &self.system
    }

    // ── Pipelines ───────────────────────────────────────────────────

    fn engine(&self) -> AsyncPipeline {
        AsyncPipeline::new(
            self.endpoint.clone(),
            self.canonicalizer.clone(),
            PipelineTiming::from_config(&self.config),
        )
    }

    pub fn consumer_negotiation_pipeline(&self) -> ConsumerNegotiationPipeline {
        ConsumerNegotiationPipeline::new(
            self.engine(),
            self.clients.consumer_negotiation.clone(),
            self.harness.clone(),
            &self.config.connector_under_test_id,
        )
    }

    pub fn provider_negotiation_pipeline(&self) -> ProviderNegotiationPipeline {
        ProviderNegotiationPipeline::new(
            self.engine(),
            self.clients.provider_negotiation.clone(),
            self.harness.clone(),
            &self.config.connector_under_test_id,
        )
    }

    pub fn consumer_transfer_pipeline(&self) -> ConsumerTransferPipeline {
        ConsumerTransferPipeline::new(
            self.engine(),
            self.clients.consumer_transfer.clone(),
            self.harness.clone(),
            &self.config.connector_under_test_id,
        )
    }

    pub fn provider_transfer_pipeline(&self) -> ProviderTransferPipeline {
        ProviderTransferPipeline::new(
            self.engine(),
            self.clients.provider_transfer.clone(),
            self.harness.clone(),
            &self.config.connector_under_test_id,
        )
    }

    /// Version metadata of the connector under test.
    pub fn metadata_client(&self) -> Arc<dyn MetadataClient> {
        self.clients.metadata.clone()
    }

    // ── Mocks ───────────────────────────────────────────────────────

    pub fn consumer_negotiation_mock(&self) -> Arc<dyn ConsumerNegotiationMock> {
        if !self.config.local_connector {
            return Arc::new(NoOpMock);
        }
        Arc::new(LocalNegotiationMock::new(
            self.system.consumer_negotiation.clone(),
            self.handle.clone(),
            self.config.pause,
        ))
    }

    pub fn provider_negotiation_mock(&self) -> Arc<dyn ProviderNegotiationMock> {
        if !self.config.local_connector {
            return Arc::new(NoOpMock);
        }
        Arc::new(LocalNegotiationMock::new(
            self.system.provider_negotiation.clone(),
            self.handle.clone(),
            self.config.pause,
        ))
    }

    pub fn consumer_transfer_mock(&self) -> Arc<dyn ConsumerTransferProcessMock> {
        if !self.config.local_connector {
            return Arc::new(NoOpMock);
        }
        Arc::new(LocalTransferProcessMock::new(
            self.system.consumer_transfer.clone(),
            self.handle.clone(),
            self.config.pause,
        ))
    }

    pub fn provider_transfer_mock(&self) -> Arc<dyn ProviderTransferProcessMock> {
        if !self.config.local_connector {
            return Arc::new(NoOpMock);
        }
        Arc::new(LocalTransferProcessMock::new(
            self.system.provider_transfer.clone(),
            self.handle.clone(),
            self.config.pause,
        ))
    }

    /// Context for the reference connector's counter-party actions.
    pub fn action_context(&self) -> ActionContext {
        ActionContext {
            transport: self.transport.clone(),
            canonicalizer: self.canonicalizer.clone(),
            harness_address: self.endpoint.address().to_string(),
            own_address: self.system_endpoint.address().to_string(),
            participant_id: self.config.connector_under_test_id.clone(),
            system: self.system.clone(),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Binds the harness callback server when networked. Local runs need no
    /// socket and return `None`.
    pub fn start_server(&self) -> Result<Option<SocketAddr>, TckError> {
        if self.config.local_connector {
            return Ok(None);
        }
        let mut server = self.server.lock();
        if let Some(running) = server.as_ref() {
            return Ok(Some(running.local_addr()));
        }
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.callback_port));
        let started = server::serve(&self.handle, self.endpoint.clone(), addr)?;
        let local_addr = started.local_addr();
        *server = Some(started);
        Ok(Some(local_addr))
    }

    /// Stops the callback server and the executor without waiting for
    /// in-flight mock actions.
    pub fn shutdown(&mut self) {
        if let Some(mut server) = self.server.lock().take() {
            server.shutdown();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            info!("TCK runtime shut down");
        }
    }
}

impl Drop for TckRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn required(value: &Option<String>, key: &str) -> Result<String, TckError> {
    value
        .clone()
        .ok_or_else(|| TckError::ValidationFailure(format!("Missing required configuration: {key}")))
}
