/// Seven-state connection lifecycle (§4.1). `Error` is reachable from any
/// state; `Disconnecting` only from `Connected` or mid-negotiation via
/// `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    RequestMic,
    CreateSession,
    FetchToken,
    NegotiateSdp,
    AwaitDataChannel,
    AwaitSessionAck,
    Connected,
    Disconnecting,
    Error,
}

impl ConnectionState {
    pub fn percent_complete(self) -> u8 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::RequestMic => 10,
            ConnectionState::CreateSession => 25,
            ConnectionState::FetchToken => 45,
            ConnectionState::NegotiateSdp => 65,
            ConnectionState::AwaitDataChannel => 80,
            ConnectionState::AwaitSessionAck => 95,
            ConnectionState::Connected => 100,
            ConnectionState::Disconnecting => 0,
            ConnectionState::Error => 0,
        }
    }
}
