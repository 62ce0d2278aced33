use num_enum::{FromPrimitive, IntoPrimitive};

/// Four byte command status carried in response headers.
///
/// The conversion from the wire is total: values outside the SMPP 3.4 set
/// land in [`CommandStatus::Other`] instead of failing the decode, since a
/// peer may legitimately use reserved or vendor codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum CommandStatus {
    Ok = 0x0000_0000,
    InvMsgLen = 0x0000_0001,
    InvCmdLen = 0x0000_0002,
    InvCmdId = 0x0000_0003,
    InvBnd = 0x0000_0004,
    AlyBnd = 0x0000_0005,
    InvPrtFlg = 0x0000_0006,
    InvRegDlvFlg = 0x0000_0007,
    SysErr = 0x0000_0008,
    InvSrcAdr = 0x0000_000A,
    InvDstAdr = 0x0000_000B,
    InvMsgId = 0x0000_000C,
    BindFail = 0x0000_000D,
    InvPaswd = 0x0000_000E,
    InvSysId = 0x0000_000F,
    CancelFail = 0x0000_0011,
    ReplaceFail = 0x0000_0013,
    MsgQFul = 0x0000_0014,
    InvSerTyp = 0x0000_0015,
    InvNumDe = 0x0000_0033,
    InvDlName = 0x0000_0034,
    InvDestFlag = 0x0000_0040,
    InvSubRep = 0x0000_0042,
    InvEsmClass = 0x0000_0043,
    CntSubDl = 0x0000_0044,
    SubmitFail = 0x0000_0045,
    InvSrcTon = 0x0000_0048,
    InvSrcNpi = 0x0000_0049,
    InvDstTon = 0x0000_0050,
    InvDstNpi = 0x0000_0051,
    InvSysTyp = 0x0000_0053,
    InvRepFlag = 0x0000_0054,
    InvNumMsgs = 0x0000_0055,
    Throttled = 0x0000_0058,
    InvSched = 0x0000_0061,
    InvExpiry = 0x0000_0062,
    InvDftMsgId = 0x0000_0063,
    TempAppErr = 0x0000_0064,
    PermAppErr = 0x0000_0065,
    RejeAppErr = 0x0000_0066,
    QueryFail = 0x0000_0067,
    InvOptParStream = 0x0000_00C0,
    OptParNotAllwd = 0x0000_00C1,
    InvParLen = 0x0000_00C2,
    MissingOptParam = 0x0000_00C3,
    InvOptParamVal = 0x0000_00C4,
    DeliveryFailure = 0x0000_00FE,
    UnknownErr = 0x0000_00FF,
    #[num_enum(catch_all)]
    Other(u32),
}

impl Default for CommandStatus {
    fn default() -> Self {
        CommandStatus::Ok
    }
}

impl CommandStatus {
    /// Human readable rendering of the status, used when surfacing non-OK
    /// responses as errors.
    pub fn message(self) -> &'static str {
        match self {
            CommandStatus::Ok => "No Error",
            CommandStatus::InvMsgLen => "Message Length is invalid",
            CommandStatus::InvCmdLen => "Command Length is invalid",
            CommandStatus::InvCmdId => "Invalid Command ID",
            CommandStatus::InvBnd => "Incorrect BIND Status for given command",
            CommandStatus::AlyBnd => "ESME Already in Bound State",
            CommandStatus::InvPrtFlg => "Invalid Priority Flag",
            CommandStatus::InvRegDlvFlg => "Invalid Registered Delivery Flag",
            CommandStatus::SysErr => "System Error",
            CommandStatus::InvSrcAdr => "Invalid Source Address",
            CommandStatus::InvDstAdr => "Invalid Destination Address",
            CommandStatus::InvMsgId => "Message ID is invalid",
            CommandStatus::BindFail => "Bind Failed",
            CommandStatus::InvPaswd => "Invalid Password",
            CommandStatus::InvSysId => "Invalid System ID",
            CommandStatus::CancelFail => "Cancel SM Failed",
            CommandStatus::ReplaceFail => "Replace SM Failed",
            CommandStatus::MsgQFul => "Message Queue Full",
            CommandStatus::InvSerTyp => "Invalid Service Type",
            CommandStatus::InvNumDe => "Invalid number of destinations",
            CommandStatus::InvDlName => "Invalid Distribution List name",
            CommandStatus::InvDestFlag => "Destination flag is invalid",
            CommandStatus::InvSubRep => "Invalid 'submit with replace' request",
            CommandStatus::InvEsmClass => "Invalid esm_class field data",
            CommandStatus::CntSubDl => "Cannot Submit to Distribution List",
            CommandStatus::SubmitFail => "submit_sm or submit_multi failed",
            CommandStatus::InvSrcTon => "Invalid Source address TON",
            CommandStatus::InvSrcNpi => "Invalid Source address NPI",
            CommandStatus::InvDstTon => "Invalid Destination address TON",
            CommandStatus::InvDstNpi => "Invalid Destination address NPI",
            CommandStatus::InvSysTyp => "Invalid system_type field",
            CommandStatus::InvRepFlag => "Invalid replace_if_present flag",
            CommandStatus::InvNumMsgs => "Invalid number of messages",
            CommandStatus::Throttled => {
                "Throttling error (ESME has exceeded allowed message limits)"
            }
            CommandStatus::InvSched => "Invalid Scheduled Delivery Time",
            CommandStatus::InvExpiry => "Invalid message Expiry time",
            CommandStatus::InvDftMsgId => "Predefined Message Invalid or Not Found",
            CommandStatus::TempAppErr => "ESME Receiver Temporary App Error Code",
            CommandStatus::PermAppErr => "ESME Receiver Permanent App Error Code",
            CommandStatus::RejeAppErr => "ESME Receiver Reject Message Error Code",
            CommandStatus::QueryFail => "query_sm request failed",
            CommandStatus::InvOptParStream => "Error in the optional part of the PDU Body",
            CommandStatus::OptParNotAllwd => "Optional Parameter not allowed",
            CommandStatus::InvParLen => "Invalid Parameter Length",
            CommandStatus::MissingOptParam => "Expected Optional Parameter missing",
            CommandStatus::InvOptParamVal => "Invalid Optional Parameter Value",
            CommandStatus::DeliveryFailure => "Delivery Failure",
            CommandStatus::UnknownErr => "Unknown Error",
            CommandStatus::Other(_) => "Unknown Status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_conversion() {
        assert_eq!(CommandStatus::from(0x0000_000Bu32), CommandStatus::InvDstAdr);
        assert_eq!(CommandStatus::from(0x0000_0058u32), CommandStatus::Throttled);
        assert_eq!(
            CommandStatus::from(0xDEAD_BEEFu32),
            CommandStatus::Other(0xDEAD_BEEF)
        );
        assert_eq!(u32::from(CommandStatus::Other(0xDEAD_BEEF)), 0xDEAD_BEEF);
        assert_eq!(u32::from(CommandStatus::InvDstAdr), 0x0000_000B);
    }

    #[test]
    fn messages() {
        assert_eq!(
            CommandStatus::InvDstAdr.message(),
            "Invalid Destination Address"
        );
        assert_eq!(CommandStatus::Other(0x77).message(), "Unknown Status");
    }
}
