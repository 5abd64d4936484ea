use super::response::write_status;
use crate::beacon::Beacon;
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::Arc;
use tracing::debug;

/// `may_minihttp` service answering every request through a shared [`Beacon`].
#[derive(Clone)]
pub struct BeaconService {
    pub beacon: Arc<Beacon>,
}

impl BeaconService {
    pub fn new(beacon: Arc<Beacon>) -> Self {
        Self { beacon }
    }
}

impl HttpService for BeaconService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        debug!(method = %req.method(), target = %req.path(), "HTTP request parsed");
        let status = self.beacon.handle(req.path());
        write_status(res, status);
        Ok(())
    }
}
