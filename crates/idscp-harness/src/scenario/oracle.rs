//! Reusable oracle functions.

use idscp_core::FsmState;

use super::OracleFn;

/// Every handshake succeeded and every session is connected.
pub fn all_established() -> OracleFn {
    Box::new(|world| {
        for peer in world.peers() {
            match world.handshake(peer.name()) {
                Some(Ok(())) => {},
                Some(Err(err)) => return Err(format!("{}: handshake failed: {err}", peer.name())),
                None => return Err(format!("{}: handshake never ran", peer.name())),
            }
            if !peer.fsm().is_connected() {
                return Err(format!("{}: not connected, in {:?}", peer.name(), peer.state()));
            }
        }
        Ok(())
    })
}

/// Every handshake failed and every session is closed forever.
pub fn all_closed() -> OracleFn {
    Box::new(|world| {
        for peer in world.peers() {
            if let Some(Ok(())) = world.handshake(peer.name()) {
                return Err(format!("{}: handshake unexpectedly succeeded", peer.name()));
            }
            if peer.state() != FsmState::Closed || !peer.fsm().is_locked() {
                return Err(format!("{}: not closed forever, in {:?}", peer.name(), peer.state()));
            }
        }
        Ok(())
    })
}

/// Each prover runs the mechanism its counterpart verifies with.
pub fn mechanisms_agree() -> OracleFn {
    Box::new(|world| {
        let [a, b] = world.peers() else {
            return Err("mechanism agreement needs exactly two peers".to_string());
        };
        let (a_prover, a_verifier) = a.fsm().mechanisms().map_err(|err| err.to_string())?;
        let (b_prover, b_verifier) = b.fsm().mechanisms().map_err(|err| err.to_string())?;

        if a_prover != b_verifier {
            return Err(format!(
                "{} proves {a_prover:?}, {} verifies {b_verifier:?}",
                a.name(),
                b.name()
            ));
        }
        if b_prover != a_verifier {
            return Err(format!(
                "{} proves {b_prover:?}, {} verifies {a_verifier:?}",
                b.name(),
                a.name()
            ));
        }
        Ok(())
    })
}

/// Run several oracles; the first failure wins.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}
