//! Polling rate read/write (class 0x00, id 0x05 / 0x85).
//!
//! The wire value is the report interval in milliseconds:
//!   0x01 = 1000 Hz, 0x02 = 500 Hz, 0x04 = 250 Hz, 0x08 = 125 Hz

use crate::capability::Operation;
use crate::device::PollingRate;
use crate::encode::Command;
use crate::error::{Error, Result};
use crate::session::DeviceSession;

/// Read the current polling rate.
pub fn read_polling_rate(session: &DeviceSession) -> Result<PollingRate> {
    if let Some(shadow) = session.shadow() {
        session.resolve(Operation::GetPollingRate)?;
        return Ok(shadow.polling_rate);
    }

    let resp = session.read(&Command::GetPollingRate)?;
    let code = resp.arg(0);
    PollingRate::from_code(code)
        .ok_or_else(|| Error::MalformedResponse(format!("unknown polling rate code 0x{code:02X}")))
}

/// Set the polling rate.
pub fn write_polling_rate(session: &DeviceSession, rate: PollingRate) -> Result<()> {
    if session.is_shadowed() {
        session.resolve(Operation::SetPollingRate)?;
        return session.write_shadowed(Operation::SetPollingRate, |s| {
            s.polling_rate = rate;
            let (x, y) = s.dpi;
            Command::SetCombinedPollDpi { rate, x, y }
        });
    }
    session.write(&Command::SetPollingRate(rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityTable, ModelId};
    use crate::pids;
    use crate::transaction::mock::MockTransport;
    use std::sync::Arc;

    fn attach(pid: u16, mock: &Arc<MockTransport>) -> DeviceSession {
        DeviceSession::attach(CapabilityTable::builtin().unwrap(), ModelId(pid), mock.clone()).unwrap()
    }

    #[test]
    fn read_1000hz() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(0x00, 0x85, &[0x01]);
        let s = attach(pids::DEATHADDER_ELITE, &mock);
        assert_eq!(read_polling_rate(&s).unwrap(), PollingRate::Hz1000);
    }

    #[test]
    fn read_unknown_code() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(0x00, 0x85, &[0x03]);
        let s = attach(pids::DEATHADDER_ELITE, &mock);
        assert!(matches!(
            read_polling_rate(&s),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn write_250hz() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::DEATHADDER_ELITE, &mock);
        write_polling_rate(&s, PollingRate::Hz250).unwrap();
        let req = &mock.requests()[0];
        assert_eq!((req.command_class(), req.command_id()), (0x00, 0x05));
        assert_eq!(req.payload(), &[0x04]);
    }

    #[test]
    fn shadowed_rate_keeps_dpi() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::OROCHI_2011, &mock);
        write_polling_rate(&s, PollingRate::Hz125).unwrap();
        assert_eq!(mock.requests()[0].payload(), &[8, 8, 0x08]);
        assert_eq!(read_polling_rate(&s).unwrap(), PollingRate::Hz125);
        assert_eq!(mock.exchange_count(), 1);
    }
}
