//! USIM file access against a scripted card

mod common;

use common::{capture_logs, connect, fcp, MockCard};
use uicc_card::{CardError, FileAccess, FileStructure, Usim};
use uicc_common::codec::{bcd_to_ascii, decode_isdn, encode_iccid, encode_isdn};

const ICCID_FCP: &str = "8202412183022FE28A01058B036F06038002000A";
const MSISDN_FCP: &str = "8205422100260283026F408002004C";
const EFDIR_FCP: &str = "82054221001A0183022F008002001A";
const EFDIR_RECORD: &str = "61184F10A0000000871002FFFFFFFF8903020000500455534940";

fn usim(card: MockCard) -> Usim<MockCard> {
    Usim::new(connect(card))
}

fn sent(usim: &mut Usim<MockCard>) -> Vec<String> {
    usim.transport().link().sent()
}

#[test]
fn test_read_transparent_file() {
    let mut usim = usim(
        MockCard::new()
            .reply("6116")
            .reply(&(fcp(ICCID_FCP) + "9000"))
            .reply("981010325476981032549000"),
    );

    let content = usim.read_file("ICCID").unwrap();
    assert_eq!(content.len(), 1);
    assert_eq!(bcd_to_ascii(&content[0]), "89010123456789012345");

    let file = usim.selected().unwrap();
    assert_eq!(file.size, 10);
    assert_eq!(file.id, 0x2FE2);

    assert_eq!(
        sent(&mut usim),
        vec!["00A40804022FE2", "00C0000016", "00B000000A"]
    );
}

#[test]
fn test_read_record_file() {
    let record = encode_isdn("33612345678", 0x26).unwrap();
    let mut answer = record.clone();
    answer.extend_from_slice(&[0x90, 0x00]);

    let mut usim = usim(
        MockCard::new()
            .reply("6111")
            .reply(&(fcp(MSISDN_FCP) + "9000"))
            .reply_bytes(answer.clone())
            .reply_bytes(answer),
    );

    let records = usim.read_file("MSISDN").unwrap();
    assert_eq!(records, vec![record.clone(), record]);
    assert_eq!(decode_isdn(&records[0]), "33612345678");
    assert_eq!(usim.selected().unwrap().structure, FileStructure::LinearFixed);

    let commands = sent(&mut usim);
    assert_eq!(commands[0], "00A40804047FF06F40");
    assert_eq!(commands[2], "00B2010426");
    assert_eq!(commands[3], "00B2020426");
}

#[test]
fn test_large_transparent_file_is_read_in_windows() {
    // 300 byte file: one 255 byte window, then 45 bytes at offset 255
    let mut first = vec![0xAA; 255];
    first.extend_from_slice(&[0x90, 0x00]);
    let mut second = vec![0xBB; 45];
    second.extend_from_slice(&[0x90, 0x00]);

    let mut usim = usim(
        MockCard::new()
            .reply("610A")
            .reply(&(fcp("820241218002012C") + "9000"))
            .reply_bytes(first)
            .reply_bytes(second),
    );

    let content = usim.read_file("Service Provider Name").unwrap();
    assert_eq!(content[0].len(), 300);
    assert_eq!(content[0][254], 0xAA);
    assert_eq!(content[0][255], 0xBB);

    let commands = sent(&mut usim);
    assert_eq!(commands[2], "00B00000FF");
    assert_eq!(commands[3], "00B000FF2D");
}

#[test]
fn test_write_transparent_with_fill() {
    let mut usim = usim(
        MockCard::new()
            .reply("610A")
            .reply(&(fcp("8202412180020011") + "9000"))
            .reply("9000"),
    );

    let spn = [vec![0x01, b'T', b'e', b's', b't']];
    usim.write_file("Service Provider Name", &spn, true, false)
        .unwrap();

    let commands = sent(&mut usim);
    assert_eq!(
        commands[2],
        format!("00D6000011{}{}", "0154657374", "FF".repeat(12))
    );
}

#[test]
fn test_iccid_failing_luhn_is_still_written() {
    let iccid = encode_iccid("89010123456789012341").unwrap();
    let mut usim = usim(
        MockCard::new()
            .reply("6116")
            .reply(&(fcp(ICCID_FCP) + "9000"))
            .reply("9000"),
    );

    usim.write_file("ICCID", &[iccid], false, false).unwrap();
    assert_eq!(sent(&mut usim)[2], "00D600000A98101032547698103214");
}

#[test]
fn test_iccid_failing_luhn_logs_warning() {
    let (iccid, logs) = capture_logs(|| encode_iccid("89010123456789012341"));
    assert!(iccid.is_ok());

    let logs = logs.contents();
    assert!(logs.contains("WARN"), "no warning in: {}", logs);
    assert!(logs.contains("Luhn check digit is not valid"));
    assert!(logs.contains("89010123456789012341"));

    let (_, logs) = capture_logs(|| encode_iccid("89014103211118510720"));
    assert!(!logs.contents().contains("Luhn"));
}

#[test]
fn test_large_transparent_file_is_written_in_windows() {
    let mut usim = usim(
        MockCard::new()
            .reply("610A")
            .reply(&(fcp("820241218002012C") + "9000"))
            .reply("9000")
            .reply("9000"),
    );

    usim.write_file("Service Provider Name", &[vec![0x01; 10]], true, false)
        .unwrap();

    let commands = sent(&mut usim);
    assert_eq!(commands.len(), 4);
    assert_eq!(
        commands[2],
        format!("00D60000FF{}{}", "01".repeat(10), "FF".repeat(245))
    );
    assert_eq!(commands[3], format!("00D600FF2D{}", "FF".repeat(45)));
}

#[test]
fn test_write_records_pads_each_record() {
    let mut usim = usim(
        MockCard::new()
            .reply("6111")
            .reply(&(fcp(MSISDN_FCP) + "9000"))
            .reply("9000")
            .reply("9000"),
    );

    usim.write_file("MSISDN", &[vec![0x01], vec![0x02, 0x03]], false, false)
        .unwrap();

    let commands = sent(&mut usim);
    assert_eq!(commands[2], format!("00DC010426{}{}", "01", "FF".repeat(37)));
    assert_eq!(commands[3], format!("00DC020426{}{}", "0203", "FF".repeat(36)));
}

#[test]
fn test_record_too_long_sends_nothing() {
    let mut usim = usim(
        MockCard::new()
            .reply("6111")
            .reply(&(fcp(MSISDN_FCP) + "9000")),
    );

    let err = usim
        .write_file("MSISDN", &[vec![0x00; 0x27]], false, false)
        .unwrap_err();
    assert!(matches!(
        err,
        CardError::RecordTooLong { len: 0x27, record_length: 0x26 }
    ));
    assert!(!err.is_fatal());
    assert_eq!(sent(&mut usim).len(), 2);
}

#[test]
fn test_too_many_records() {
    let mut usim = usim(
        MockCard::new()
            .reply("6111")
            .reply(&(fcp(MSISDN_FCP) + "9000")),
    );

    let err = usim
        .write_file("MSISDN", &[vec![], vec![], vec![]], false, false)
        .unwrap_err();
    assert!(matches!(err, CardError::TooManyRecords { count: 3, capacity: 2 }));
}

#[test]
fn test_record_mode_on_transparent_file() {
    let mut usim = usim(
        MockCard::new()
            .reply("6116")
            .reply(&(fcp(ICCID_FCP) + "9000")),
    );

    let err = usim
        .write_file("ICCID", &[vec![0x00]], false, true)
        .unwrap_err();
    assert!(matches!(err, CardError::NotRecordFile));
}

#[test]
fn test_file_record_size() {
    let mut usim = usim(
        MockCard::new()
            .reply("6111")
            .reply(&(fcp(MSISDN_FCP) + "9000"))
            .reply("6116")
            .reply(&(fcp(ICCID_FCP) + "9000")),
    );

    assert_eq!(usim.file_record_size("MSISDN").unwrap(), Some(0x26));
    assert_eq!(usim.file_record_size("ICCID").unwrap(), None);
}

#[test]
fn test_failed_select_clears_descriptor() {
    let mut usim = usim(
        MockCard::new()
            .reply("6116")
            .reply(&(fcp(ICCID_FCP) + "9000"))
            .reply("6A82"),
    );

    usim.select_file("ICCID").unwrap();
    assert!(usim.selected().is_some());

    let err = usim.select_file("IMSI").unwrap_err();
    assert!(matches!(
        err,
        CardError::UnexpectedStatus { command: "SELECT", sw: 0x6A82 }
    ));
    assert!(!err.is_fatal());
    assert!(usim.selected().is_none());
}

#[test]
fn test_answer_without_fcp_template() {
    let mut usim = usim(MockCard::new().reply("6104").reply("820241219000"));

    let err = usim.select_file("ICCID").unwrap_err();
    assert!(matches!(err, CardError::InvalidFcp));
}

#[test]
fn test_unknown_file_is_fatal() {
    let mut usim = usim(MockCard::new());

    let err = usim.read_file("Location information").unwrap_err();
    assert!(matches!(err, CardError::UnknownFile(_)));
    assert!(err.is_fatal());
    assert!(sent(&mut usim).is_empty());
}

#[test]
fn test_select_application() {
    let mut usim = usim(
        MockCard::new()
            .reply("6111")
            .reply(&(fcp(EFDIR_FCP) + "9000"))
            .reply(&(EFDIR_RECORD.to_string() + "9000"))
            .reply("9000"),
    );

    let aid = usim.select_application().unwrap();
    assert_eq!(hex::encode_upper(&aid), "A0000000871002FFFFFFFF8903020000");

    let commands = sent(&mut usim);
    assert_eq!(commands[2], "00B201041A");
    assert_eq!(commands[3], "00A4040C10A0000000871002FFFFFFFF8903020000");
}

#[test]
fn test_verify_chv() {
    let mut usim = usim(MockCard::new().reply("9000").reply("63C2"));

    assert!(usim.verify_chv(0x0A, b"88888888").unwrap());
    assert!(!usim.verify_chv(0x0A, b"1234").unwrap());

    let commands = sent(&mut usim);
    assert_eq!(commands[0], "0020000A083838383838383838");
    assert_eq!(commands[1], "0020000A0831323334FFFFFFFF");
}

#[test]
fn test_pin_too_long() {
    let mut usim = usim(MockCard::new());
    let err = usim.verify_chv(0x01, b"123456789").unwrap_err();
    assert!(matches!(err, CardError::PinTooLong(9)));
    assert!(sent(&mut usim).is_empty());
}
