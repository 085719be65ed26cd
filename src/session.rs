/// Handle for one issued fetch. Only the most recently issued ticket may
/// replace the session's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
}

impl FetchTicket {
    pub fn seq(self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// A newer fetch was issued after this one; its result was dropped.
    Stale { latest: u64 },
    /// The fetch failed; whatever was applied before stays in place.
    Failed { message: String },
}

/// Last-issued-wins holder for one view (one table on one screen).
#[derive(Debug, Clone)]
pub struct ViewSession<T> {
    issued: u64,
    applied: Option<u64>,
    current: Option<T>,
    last_error: Option<String>,
}

impl<T> Default for ViewSession<T> {
    fn default() -> Self {
        Self {
            issued: 0,
            applied: None,
            current: None,
            last_error: None,
        }
    }
}

impl<T> ViewSession<T> {
    /// Registers a new fetch. Callers that number their own requests pass
    /// `seq`; a number at or below one already issued yields a ticket that
    /// is already stale unless it equals the latest.
    pub fn begin(&mut self, seq: Option<u64>) -> FetchTicket {
        let seq = seq.unwrap_or(self.issued + 1);
        if seq > self.issued {
            self.issued = seq;
        }
        FetchTicket { seq }
    }

    pub fn is_latest(&self, ticket: FetchTicket) -> bool {
        ticket.seq == self.issued
    }

    pub fn complete<E: std::fmt::Display>(
        &mut self,
        ticket: FetchTicket,
        result: Result<T, E>,
    ) -> Completion {
        if !self.is_latest(ticket) {
            tracing::debug!(seq = ticket.seq, latest = self.issued, "dropping stale view result");
            return Completion::Stale {
                latest: self.issued,
            };
        }
        match result {
            Ok(view) => {
                self.current = Some(view);
                self.applied = Some(ticket.seq);
                self.last_error = None;
                Completion::Applied
            }
            Err(e) => {
                let message = e.to_string();
                self.last_error = Some(message.clone());
                Completion::Failed { message }
            }
        }
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn applied_seq(&self) -> Option<u64> {
        self.applied
    }

    pub fn issued_seq(&self) -> u64 {
        self.issued
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
