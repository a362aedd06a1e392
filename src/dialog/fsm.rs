use crate::{Error, Result};

/// Progress of one SIP dialog through registration, call setup and
/// teardown. State names follow the wire exchanges that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Init,
    WaitingForRegister,
    RegisterSent200,
    InviteSent100,
    InviteSent180,
    InviteSent183,
    InviteSent200,
    CallEstablished,
    CallCancelled,
    CallTerminated,
    SentBye,
}

/// Inputs that drive [`CallState`]. Send-side events fire just before
/// the corresponding response goes out; recv-side events fire when the
/// peer's request arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    RegisterSend200,
    RegisterFailed,
    InviteSend100,
    InviteSend180,
    InviteSend183,
    InviteSend200,
    InviteRecvAck,
    RecvCancel,
    SendBye,
    RecvBye,
    Recv200,
}

impl CallState {
    /// The successor state for `event`, or `IllegalTransition` when the
    /// event is not admitted from the current state. Self-loops absorb
    /// retransmissions where listed (REGISTER while registered).
    pub fn apply(self, event: CallEvent) -> Result<CallState> {
        use CallEvent::*;
        use CallState::*;

        let next = match (event, self) {
            (
                RegisterSend200,
                Init | WaitingForRegister | CallTerminated | RegisterSent200,
            ) => RegisterSent200,
            (RegisterFailed, RegisterSent200) => WaitingForRegister,
            // REGISTER is optional, so an INVITE may arrive cold
            (InviteSend100, Init | RegisterSent200 | CallTerminated | CallCancelled) => {
                InviteSent100
            }
            (InviteSend180, InviteSent100) => InviteSent180,
            (InviteSend183, InviteSent180) => InviteSent183,
            // the fast path answers 200 without the provisional chain
            (
                InviteSend200,
                Init | RegisterSent200 | InviteSent183 | CallTerminated | CallCancelled,
            ) => InviteSent200,
            (InviteRecvAck, InviteSent200) => CallEstablished,
            (
                RecvCancel,
                InviteSent100 | InviteSent180 | InviteSent183 | InviteSent200 | CallEstablished
                | CallTerminated,
            ) => CallCancelled,
            (SendBye, CallEstablished) => SentBye,
            (RecvBye, CallEstablished | InviteSent200 | CallCancelled) => CallTerminated,
            (Recv200, SentBye) => CallTerminated,
            (event, state) => return Err(Error::IllegalTransition(event, state)),
        };
        Ok(next)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallState::Init => "init",
            CallState::WaitingForRegister => "waiting_for_register",
            CallState::RegisterSent200 => "register_sent_200",
            CallState::InviteSent100 => "invite_sent_100",
            CallState::InviteSent180 => "invite_sent_180",
            CallState::InviteSent183 => "invite_sent_183",
            CallState::InviteSent200 => "invite_sent_200",
            CallState::CallEstablished => "call_established",
            CallState::CallCancelled => "call_cancelled",
            CallState::CallTerminated => "call_terminated",
            CallState::SentBye => "sent_bye",
        };
        write!(f, "{}", name)
    }
}

impl std::fmt::Display for CallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallEvent::RegisterSend200 => "register_send_200",
            CallEvent::RegisterFailed => "register_failed",
            CallEvent::InviteSend100 => "invite_send_100",
            CallEvent::InviteSend180 => "invite_send_180",
            CallEvent::InviteSend183 => "invite_send_183",
            CallEvent::InviteSend200 => "invite_send_200",
            CallEvent::InviteRecvAck => "invite_recv_ack",
            CallEvent::RecvCancel => "recv_cancel",
            CallEvent::SendBye => "send_bye",
            CallEvent::RecvBye => "recv_bye",
            CallEvent::Recv200 => "recv_200",
        };
        write!(f, "{}", name)
    }
}
