//! Instrument discovery and role allocation.
//!
//! A discovery pass enumerates every address on the bus and handshakes each
//! with `*IDN?` under a short timeout, building the handshake map. One dead
//! instrument never blocks discovery of the rest: a timed-out address is
//! simply absent from the map.
//!
//! [`allocate`](InstrumentDiscovery::allocate) binds discovered addresses to
//! logical roles. Candidates are the driver kind's default addresses, in
//! declaration order, that answered the handshake and are not already
//! allocated. Switching to a driver kind with a different default-address
//! set starts a fresh allocation pool. The interactive variant routes each
//! candidate through an [`AllocationPrompt`] so an operator can steer which
//! physical unit serves which role when identical models are wired up:
//! rejected candidates are shut back down and the next one is offered.

use crate::error::{AppResult, DaqError};
use crate::instrument::{Active, Instrument};
use crate::session::SessionManager;
use log::{error, info, warn};
use std::collections::HashMap;
use std::io::BufRead;

/// Operator confirmation seam for interactive allocation.
pub trait AllocationPrompt {
    /// Present a live candidate. Return true to accept the allocation,
    /// false to shut the candidate down and offer the next one.
    fn confirm(&mut self, address: &str, identity: &str) -> bool;
}

impl<F: FnMut(&str, &str) -> bool> AllocationPrompt for F {
    fn confirm(&mut self, address: &str, identity: &str) -> bool {
        self(address, identity)
    }
}

/// Console prompt: Enter accepts the candidate, any other input skips it.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl AllocationPrompt for StdinPrompt {
    fn confirm(&mut self, address: &str, identity: &str) -> bool {
        println!();
        println!("\tOne instrument was switched to remote operation and was assigned a mode for present measurement");
        println!("\t  {address}  {identity}");
        println!("\tTo confirm the allocation press Enter; any other input offers the next instrument");
        println!();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(_) => line.trim().is_empty(),
            Err(_) => false,
        }
    }
}

/// Discovery results and the allocation state for one script run.
pub struct InstrumentDiscovery {
    manager: SessionManager,
    discovered: Vec<String>,
    handshakes: HashMap<String, String>,
    pool_defaults: &'static [&'static str],
    allocated: Vec<String>,
}

impl InstrumentDiscovery {
    /// Enumerate the bus and run the identification handshake against every
    /// address. Fails only on a bus-level enumeration error; per-address
    /// handshake failures are recorded as absence and never propagate.
    pub fn new(manager: SessionManager) -> AppResult<Self> {
        let mut discovery = Self {
            manager,
            discovered: Vec::new(),
            handshakes: HashMap::new(),
            pool_defaults: &[],
            allocated: Vec::new(),
        };
        discovery.refresh()?;
        Ok(discovery)
    }

    /// Re-run discovery, replacing the handshake map in full.
    pub fn refresh(&mut self) -> AppResult<()> {
        self.discovered = self.manager.list_resources()?;
        self.handshakes.clear();
        for (idx, address) in self.discovered.clone().iter().enumerate() {
            match self.manager.open(address) {
                Ok(mut session) => match session.handshake() {
                    Some(identity) => {
                        info!("-> [{idx}] {address} {identity}");
                        self.handshakes.insert(address.clone(), identity);
                    }
                    None => warn!("[{idx}] {address} DISCOVERED RESOURCE TIMED OUT"),
                },
                Err(err) => warn!("[{idx}] {address} could not be probed: {err}"),
            }
        }
        Ok(())
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Addresses found by the last enumeration pass, probed or not.
    pub fn discovered(&self) -> &[String] {
        &self.discovered
    }

    /// Address-to-identity map from the last discovery pass.
    pub fn handshakes(&self) -> &HashMap<String, String> {
        &self.handshakes
    }

    /// The n-th enumerated address. Out-of-range lookups are logged and
    /// answered with `None`, not an error.
    pub fn address_at(&self, index: usize) -> Option<&str> {
        let address = self.discovered.get(index).map(String::as_str);
        if address.is_none() {
            warn!("-> Instrument was not found");
        }
        address
    }

    /// Allocate the first unbound candidate for driver kind `I` without
    /// operator confirmation.
    pub fn allocate<I: Instrument>(&mut self, mode: I::Mode) -> AppResult<Active<I>> {
        self.allocate_inner(mode, None)
    }

    /// Allocate with operator confirmation per candidate.
    pub fn allocate_interactive<I: Instrument>(
        &mut self,
        mode: I::Mode,
        prompt: &mut dyn AllocationPrompt,
    ) -> AppResult<Active<I>> {
        self.allocate_inner(mode, Some(prompt))
    }

    fn allocate_inner<I: Instrument>(
        &mut self,
        mode: I::Mode,
        mut prompt: Option<&mut dyn AllocationPrompt>,
    ) -> AppResult<Active<I>> {
        // a different role family starts a fresh allocation pool
        if self.pool_defaults != I::default_addresses() {
            self.pool_defaults = I::default_addresses();
            self.allocated.clear();
        }

        let candidates: Vec<String> = I::default_addresses()
            .iter()
            .filter(|addr| {
                self.handshakes.contains_key(**addr) && !self.allocated.iter().any(|a| a == **addr)
            })
            .map(|addr| addr.to_string())
            .collect();

        for address in candidates {
            let session = self.manager.open(&address)?;
            let active = Active::bring_up(I::attach(session), mode)?;
            match prompt.as_mut() {
                None => {
                    self.allocated.push(address);
                    return Ok(active);
                }
                Some(prompt) => {
                    let identity = self
                        .handshakes
                        .get(&address)
                        .map(String::as_str)
                        .unwrap_or("<unknown>");
                    if prompt.confirm(&address, identity) {
                        self.allocated.push(address);
                        return Ok(active);
                    }
                    // rejected: the drop shuts the instrument down and
                    // closes its session before the next candidate opens
                    drop(active);
                }
            }
        }

        error!("-> Allocation ran out of the address pool for {}", I::KIND);
        Err(DaqError::AllocationExhausted { kind: I::KIND })
    }
}
