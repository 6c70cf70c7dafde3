//! Reference driver set
//!
//! Probe grammar, in the order drivers are registered by default:
//!
//! | Driver    | Probe      | Matches when an information line...        |
//! |-----------|------------|--------------------------------------------|
//! | `sim900`  | `AT+CGMM`  | contains `SIM900`                          |
//! | `huawei`  | `AT+CGMI`  | contains `HUAWEI` (any case)               |
//! | `wavecom` | `AT+CGMI`  | contains `WAVECOM` (any case)              |
//! | `generic` | `AT`       | (none needed) the answer ends with `OK`    |
//!
//! `generic` accepts any AT modem, so it must stay last.

use crate::driver::{Driver, FieldParser, Probe, ProbeMatch, SendProfile, StatusField};

/// Fields every 27.007/27.005 modem answers
fn common_fields() -> Vec<StatusField> {
    vec![
        StatusField::read_only("Manufacturer", "AT+CGMI", FieldParser::Raw),
        StatusField::read_only("Model", "AT+CGMM", FieldParser::Raw),
        StatusField::read_only("Revision", "AT+CGMR", FieldParser::Raw),
        StatusField::read_only("IMEI", "AT+CGSN", FieldParser::Raw),
        StatusField::read_only("IMSI", "AT+CIMI", FieldParser::Raw),
        StatusField::read_only("Signal Quality", "AT+CSQ", FieldParser::SignalQuality),
        StatusField::read_only("Operator", "AT+COPS?", FieldParser::Quoted("+COPS:".into())),
        StatusField::read_write(
            "Service Center",
            "AT+CSCA?",
            "AT+CSCA=\"{value}\"",
            FieldParser::Quoted("+CSCA:".into()),
        ),
        StatusField::read_write(
            "Message Format",
            "AT+CMGF?",
            "AT+CMGF={value}",
            FieldParser::Prefixed("+CMGF:".into()),
        ),
    ]
}

fn default_init() -> Vec<String> {
    // Echo off, numeric extended errors
    vec!["ATE0".into(), "AT+CMEE=1".into()]
}

/// SIMCom SIM900 GSM/GPRS module
pub fn sim900() -> Driver {
    let mut fields = common_fields();
    fields.push(StatusField::read_write(
        "Clock",
        "AT+CCLK?",
        "AT+CCLK=\"{value}\"",
        FieldParser::Quoted("+CCLK:".into()),
    ));
    fields.push(StatusField::read_only(
        "Battery Voltage",
        "AT+CBC",
        FieldParser::Csv {
            prefix: "+CBC:".into(),
            index: 2,
        },
    ));

    Driver {
        id: "sim900".into(),
        display_name: "SIM900".into(),
        probe: Probe::new("AT+CGMM", ProbeMatch::Contains("SIM900".into())),
        init: default_init(),
        fields,
        send: SendProfile::text_mode(),
    }
}

/// Huawei 3G/4G USB modems (E1550, E3372 and relatives)
pub fn huawei() -> Driver {
    let mut fields = common_fields();
    fields.push(StatusField::read_only(
        "System Info",
        "AT^SYSINFO",
        FieldParser::Prefixed("^SYSINFO:".into()),
    ));
    fields.push(StatusField::read_write(
        "Network Mode",
        "AT^SYSCFG?",
        "AT^SYSCFG={value}",
        FieldParser::Prefixed("^SYSCFG:".into()),
    ));

    Driver {
        id: "huawei".into(),
        display_name: "Huawei Modem".into(),
        probe: Probe::new("AT+CGMI", ProbeMatch::ContainsIgnoreCase("HUAWEI".into())),
        // ^CURC=0 silences periodic unsolicited status lines
        init: vec!["ATE0".into(), "AT+CMEE=1".into(), "AT^CURC=0".into()],
        fields,
        send: SendProfile::text_mode(),
    }
}

/// Sierra Wireless / Wavecom Fastrack modems
pub fn wavecom() -> Driver {
    let mut fields = common_fields();
    fields.push(StatusField::read_write(
        "Band",
        "AT+WMBS?",
        "AT+WMBS={value}",
        FieldParser::Csv {
            prefix: "+WMBS:".into(),
            index: 0,
        },
    ));

    Driver {
        id: "wavecom".into(),
        display_name: "Wavecom Fastrack".into(),
        probe: Probe::new("AT+CGMI", ProbeMatch::ContainsIgnoreCase("WAVECOM".into())),
        init: default_init(),
        fields,
        send: SendProfile::text_mode(),
    }
}

/// Any modem implementing 3GPP TS 27.005 text mode
pub fn generic() -> Driver {
    Driver {
        id: "generic".into(),
        display_name: "Generic GSM Modem".into(),
        probe: Probe::new("AT", ProbeMatch::FinalOk),
        init: default_init(),
        fields: common_fields(),
        send: SendProfile::text_mode(),
    }
}

/// All reference drivers in probe order
pub fn reference_drivers() -> Vec<Driver> {
    vec![sim900(), huawei(), wavecom(), generic()]
}
