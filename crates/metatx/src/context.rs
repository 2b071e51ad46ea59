//! ERC-2771 sender extraction for contracts that accept forwarded calls.
//!
//! A trusted forwarder appends the original signer's 20-byte address to the
//! calldata. A receiving contract must only honor that suffix when the
//! immediate caller *is* the forwarder it trusts; anyone else could append
//! arbitrary bytes.

use alloy::primitives::Address;

use crate::SENDER_SUFFIX_LEN;

/// The one forwarder a contract trusts to vouch for senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedForwarderContext {
    trusted_forwarder: Address,
}

impl TrustedForwarderContext {
    pub fn new(trusted_forwarder: Address) -> Self {
        Self { trusted_forwarder }
    }

    pub fn trusted_forwarder(&self) -> Address {
        self.trusted_forwarder
    }

    pub fn is_trusted_forwarder(&self, caller: Address) -> bool {
        caller == self.trusted_forwarder
    }

    /// The logical sender of a call.
    ///
    /// When `caller` is the trusted forwarder the sender is the last 20 bytes
    /// of `calldata`; otherwise it is `caller` itself.
    pub fn msg_sender(&self, caller: Address, calldata: &[u8]) -> Address {
        match self.forwarded_parts(caller, calldata) {
            Some((_, sender)) => sender,
            None => caller,
        }
    }

    /// The calldata the logical sender intended, without the forwarder's suffix.
    pub fn msg_data<'a>(&self, caller: Address, calldata: &'a [u8]) -> &'a [u8] {
        match self.forwarded_parts(caller, calldata) {
            Some((payload, _)) => payload,
            None => calldata,
        }
    }

    /// Resolve sender and payload together, once per incoming call.
    pub fn resolve<'a>(&self, caller: Address, calldata: &'a [u8]) -> (Address, &'a [u8]) {
        self.forwarded_parts(caller, calldata)
            .map(|(payload, sender)| (sender, payload))
            .unwrap_or((caller, calldata))
    }

    fn forwarded_parts<'a>(
        &self,
        caller: Address,
        calldata: &'a [u8],
    ) -> Option<(&'a [u8], Address)> {
        if !self.is_trusted_forwarder(caller) || calldata.len() < SENDER_SUFFIX_LEN {
            return None;
        }
        let (payload, suffix) = calldata.split_at(calldata.len() - SENDER_SUFFIX_LEN);
        Some((payload, Address::from_slice(suffix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORWARDER: Address = Address::new([0xf0; 20]);

    fn forwarded(payload: &[u8], sender: Address) -> Vec<u8> {
        let mut data = payload.to_vec();
        data.extend_from_slice(sender.as_slice());
        data
    }

    #[test]
    fn test_trusted_forwarder_suffix_is_sender() {
        let ctx = TrustedForwarderContext::new(FORWARDER);
        let signer = Address::repeat_byte(0x5a);
        let data = forwarded(&[0xaa, 0xbb], signer);

        assert_eq!(ctx.msg_sender(FORWARDER, &data), signer);
        assert_eq!(ctx.msg_data(FORWARDER, &data), &[0xaau8, 0xbb][..]);
        assert_eq!(ctx.resolve(FORWARDER, &data), (signer, &[0xaa, 0xbb][..]));
    }

    #[test]
    fn test_direct_caller_is_sender() {
        let ctx = TrustedForwarderContext::new(FORWARDER);
        let caller = Address::repeat_byte(0x11);
        let data = [0xaa, 0xbb];

        assert_eq!(ctx.msg_sender(caller, &data), caller);
        assert_eq!(ctx.msg_data(caller, &data), &data);
    }

    #[test]
    fn test_untrusted_caller_cannot_spoof_suffix() {
        let ctx = TrustedForwarderContext::new(FORWARDER);
        let attacker = Address::repeat_byte(0x66);
        let victim = Address::repeat_byte(0x5a);
        let data = forwarded(&[0x01], victim);

        assert_eq!(ctx.msg_sender(attacker, &data), attacker);
        assert_eq!(ctx.msg_data(attacker, &data).len(), data.len());
    }

    #[test]
    fn test_short_calldata_from_forwarder_falls_back_to_caller() {
        let ctx = TrustedForwarderContext::new(FORWARDER);
        let data = [0u8; 19];
        assert_eq!(ctx.msg_sender(FORWARDER, &data), FORWARDER);
        assert_eq!(ctx.msg_data(FORWARDER, &data), &data);
    }

    #[test]
    fn test_suffix_only_yields_empty_payload() {
        let ctx = TrustedForwarderContext::new(FORWARDER);
        let signer = Address::repeat_byte(0x5a);
        let data = forwarded(&[], signer);
        assert_eq!(ctx.resolve(FORWARDER, &data), (signer, &[][..]));
    }
}
