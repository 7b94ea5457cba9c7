//! Transfer process mocks over either transfer manager.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tck_core::errors::TckError;
use tck_statemachine::{TransferProcess, TransferState};
use tokio::runtime::Handle;
use tracing::debug;

use super::{
    unexecuted, ActionTable, ConsumerTransferProcessMock, ProtocolMock, ProviderTransferProcessMock,
    TransferAction,
};
use crate::manager::{ListenerId, TransferManager, TransferProcessListener};

type Table = ActionTable<TransferState, TransferProcess>;

struct MockListener {
    table: Arc<Table>,
}

impl TransferProcessListener for MockListener {
    fn transfer_initialized(&self, process: &Arc<TransferProcess>) {
        self.table.fire(TransferState::Initialized, process);
    }

    fn requested(&self, process: &Arc<TransferProcess>) {
        self.table.fire(TransferState::Requested, process);
    }

    fn started(&self, process: &Arc<TransferProcess>) {
        self.table.fire(TransferState::Started, process);
    }

    fn completed(&self, process: &Arc<TransferProcess>) {
        self.table.fire(TransferState::Completed, process);
    }

    fn suspended(&self, process: &Arc<TransferProcess>) {
        self.table.fire(TransferState::Suspended, process);
    }

    fn terminated(&self, process: &Arc<TransferProcess>) {
        self.table.fire(TransferState::Terminated, process);
    }
}

/// Mock attached to a transfer manager of the system connector.
pub struct LocalTransferProcessMock {
    manager: Arc<dyn TransferManager>,
    table: Arc<Table>,
    listener: Mutex<Option<ListenerId>>,
}

impl LocalTransferProcessMock {
    pub fn new(manager: Arc<dyn TransferManager>, handle: Handle, pause: Duration) -> Self {
        let table = Arc::new(Table::new(handle, pause));
        let listener = manager.register_listener(Arc::new(MockListener {
            table: table.clone(),
        }));
        Self {
            manager,
            table,
            listener: Mutex::new(Some(listener)),
        }
    }

    fn detach(&self) {
        if let Some(id) = self.listener.lock().take() {
            self.manager.deregister_listener(id);
            debug!("transfer mock detached");
        }
    }
}

impl ProtocolMock for LocalTransferProcessMock {
    fn verify(&self) -> Result<(), TckError> {
        self.detach();
        unexecuted(self.table.pending())
    }

    fn completed(&self) -> bool {
        self.table.pending().is_empty()
    }

    fn reset(&self) {
        self.table.clear();
    }
}

impl ConsumerTransferProcessMock for LocalTransferProcessMock {
    fn record_initialized_action(&self, action: TransferAction) {
        self.table.record(TransferState::Initialized, action);
    }

    fn record_started_action(&self, action: TransferAction) {
        self.table.record(TransferState::Started, action);
    }
}

impl ProviderTransferProcessMock for LocalTransferProcessMock {
    fn record_requested_action(&self, action: TransferAction) {
        self.table.record(TransferState::Requested, action);
    }

    fn record_started_action(&self, action: TransferAction) {
        self.table.record(TransferState::Started, action);
    }
}

impl Drop for LocalTransferProcessMock {
    fn drop(&mut self) {
        self.detach();
    }
}
