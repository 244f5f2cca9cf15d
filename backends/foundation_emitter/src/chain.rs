use crate::config::EmitterFactory;
use crate::emitter::Emitter;
use crate::errors::{EmitterError, EmitterResult};
use crate::host::HostEnvironment;
use crate::message::OutgoingResponse;
use std::collections::VecDeque;

/// Ordered, double ended list of emitters tried front to back until one
/// of them reports it handled the response.
///
/// Mutation is meant for wiring time, `emit` holds no per request state
/// so a built chain can be reused for every response.
#[derive(Default)]
pub struct EmitterChain {
    emitters: VecDeque<Box<dyn Emitter>>,
}

impl EmitterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back<E: Emitter + 'static>(&mut self, emitter: E) {
        self.emitters.push_back(Box::new(emitter));
    }

    pub fn push_front<E: Emitter + 'static>(&mut self, emitter: E) {
        self.emitters.push_front(Box::new(emitter));
    }

    pub fn pop_back(&mut self) -> Option<Box<dyn Emitter>> {
        self.emitters.pop_back()
    }

    pub fn pop_front(&mut self) -> Option<Box<dyn Emitter>> {
        self.emitters.pop_front()
    }

    /// Replaces the emitter at `index`, handing back the one it displaced.
    ///
    /// # Errors
    /// Returns [`EmitterError::IndexOutOfRange`] without touching the chain
    /// when `index` is past the end.
    pub fn set<E: Emitter + 'static>(
        &mut self,
        index: usize,
        emitter: E,
    ) -> EmitterResult<Box<dyn Emitter>> {
        self.set_boxed(index, Box::new(emitter))
    }

    /// See [`EmitterChain::set`].
    ///
    /// # Errors
    /// Returns [`EmitterError::IndexOutOfRange`] when `index` is past the end.
    pub fn set_boxed(
        &mut self,
        index: usize,
        emitter: Box<dyn Emitter>,
    ) -> EmitterResult<Box<dyn Emitter>> {
        let len = self.emitters.len();
        match self.emitters.get_mut(index) {
            Some(slot) => Ok(std::mem::replace(slot, emitter)),
            None => Err(EmitterError::IndexOutOfRange { index, len }),
        }
    }

    /// Resolves `name` through `factory` and appends the result.
    ///
    /// # Errors
    /// Returns [`EmitterError::InvalidEmitter`] for an unknown name, the
    /// chain is left as it was.
    pub fn push_back_named<H: HostEnvironment + 'static>(
        &mut self,
        name: &str,
        factory: &EmitterFactory<H>,
    ) -> EmitterResult<()> {
        let emitter = factory.resolve(name)?;
        self.emitters.push_back(emitter);
        Ok(())
    }

    /// # Errors
    /// Returns [`EmitterError::InvalidEmitter`] for an unknown name, the
    /// chain is left as it was.
    pub fn push_front_named<H: HostEnvironment + 'static>(
        &mut self,
        name: &str,
        factory: &EmitterFactory<H>,
    ) -> EmitterResult<()> {
        let emitter = factory.resolve(name)?;
        self.emitters.push_front(emitter);
        Ok(())
    }

    /// # Errors
    /// Returns [`EmitterError::InvalidEmitter`] for an unknown name or
    /// [`EmitterError::IndexOutOfRange`] for a bad index, either way the
    /// chain is left as it was.
    pub fn set_named<H: HostEnvironment + 'static>(
        &mut self,
        index: usize,
        name: &str,
        factory: &EmitterFactory<H>,
    ) -> EmitterResult<Box<dyn Emitter>> {
        let emitter = factory.resolve(name)?;
        self.set_boxed(index, emitter)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&dyn Emitter> {
        self.emitters.get(index).map(|emitter| &**emitter)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn Emitter + 'static)> {
        self.emitters.iter().map(|emitter| &**emitter)
    }
}

impl Emitter for EmitterChain {
    fn emit(&self, response: &mut OutgoingResponse) -> EmitterResult<bool> {
        for (index, emitter) in self.emitters.iter().enumerate() {
            if emitter.emit(response)? {
                tracing::trace!("Emitter at position {} handled the response", index);
                return Ok(true);
            }
            tracing::trace!("Emitter at position {} declined the response", index);
        }

        tracing::debug!(
            "No emitter in a chain of {} handled the response",
            self.emitters.len()
        );
        Ok(false)
    }
}

impl core::fmt::Debug for EmitterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterChain")
            .field("len", &self.emitters.len())
            .finish()
    }
}

#[cfg(test)]
mod emitter_chain_tests {
    use super::*;
    use crate::emitter::FnEmitter;
    use crate::message::Status;

    fn response() -> OutgoingResponse {
        OutgoingResponse::builder()
            .with_status(Status::OK)
            .build()
            .expect("should build")
    }

    #[test]
    fn empty_chain_declines() {
        let chain = EmitterChain::new();
        assert!(!chain.emit(&mut response()).expect("should not fail"));
    }

    #[test]
    fn set_out_of_range_leaves_chain_untouched() {
        let mut chain = EmitterChain::new();
        chain.push_back(FnEmitter::new(|_| Ok(false)));

        let result = chain.set(3, FnEmitter::new(|_| Ok(true)));
        assert!(matches!(
            result,
            Err(EmitterError::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert_eq!(chain.len(), 1);
        assert!(!chain.emit(&mut response()).expect("should not fail"));
    }

    #[test]
    fn get_and_iter_follow_chain_order() {
        let mut chain = EmitterChain::new();
        chain.push_back(FnEmitter::new(|_| Ok(false)));
        chain.push_back(FnEmitter::new(|_| Ok(true)));

        let answers: Vec<bool> = chain
            .iter()
            .map(|emitter| emitter.emit(&mut response()).expect("should not fail"))
            .collect();
        assert_eq!(answers, vec![false, true]);

        let last = chain.get(1).expect("index should exist");
        assert!(last.emit(&mut response()).expect("should not fail"));
        assert!(chain.get(2).is_none());
    }

    #[test]
    fn errors_abort_the_chain() {
        let mut chain = EmitterChain::new();
        chain.push_back(FnEmitter::new(|_| Err(EmitterError::OutputAlreadySent)));
        chain.push_back(FnEmitter::new(|_| Ok(true)));

        assert!(matches!(
            chain.emit(&mut response()),
            Err(EmitterError::OutputAlreadySent)
        ));
    }
}
