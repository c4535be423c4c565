// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use treefs_proto::*;

#[test]
fn test_valid_create_request() {
    let command = Command::create("/a/b", FileKind::Directory);

    assert!(validate_command(&command, DEFAULT_MAX_PATH_LEN).is_ok());
}

#[test]
fn test_valid_move_request() {
    let command = Command::parse("m /a/b /c").unwrap();

    assert!(validate_command(&command, DEFAULT_MAX_PATH_LEN).is_ok());
}

#[test]
fn test_overlong_path_is_rejected() {
    let long = format!("/{}", "x".repeat(DEFAULT_MAX_PATH_LEN));
    let command = Command::lookup(long);

    let err = validate_command(&command, DEFAULT_MAX_PATH_LEN).unwrap_err();
    assert!(matches!(err, ValidationError::PathTooLong { field: "path", .. }));
    assert_eq!(err.code(), ErrorCode::NameTooLong);
}

#[test]
fn test_overlong_destination_is_rejected() {
    let command = Command::rename("/a", format!("/{}", "y".repeat(16)));

    let err = validate_command(&command, 8).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::PathTooLong {
            field: "destination",
            max: 8,
            ..
        }
    ));
}

#[test]
fn test_empty_operand_is_rejected() {
    let command = Command::delete("");

    let err = validate_command(&command, DEFAULT_MAX_PATH_LEN).unwrap_err();
    assert_eq!(err, ValidationError::EmptyOperand { field: "path" });
    assert_eq!(err.code(), ErrorCode::InvalidCommand);
}

#[test]
fn test_embedded_nul_is_rejected() {
    let command = Command::lookup("/a\0b");

    assert_eq!(
        validate_command(&command, DEFAULT_MAX_PATH_LEN),
        Err(ValidationError::EmbeddedNul { field: "path" })
    );
}

#[test]
fn test_print_output_is_not_bound_by_path_limit() {
    let command = Command::print(format!("/tmp/{}", "o".repeat(200)));

    assert!(validate_command(&command, 10).is_ok());
}

#[test]
fn test_status_validation() {
    assert_eq!(validate_status(Status::ok(3)), Ok(Status::ok(3)));
    assert_eq!(
        validate_status(Status::error(ErrorCode::DirectoryNotEmpty)),
        Ok(Status::error(ErrorCode::DirectoryNotEmpty))
    );
    assert_eq!(
        validate_status(Status(-500)),
        Err(ValidationError::UnknownStatus(-500))
    );
}

#[test]
fn test_parsed_datagram_round_trips_through_encode() {
    let datagram = b"c /docs d\0";
    let text = std::str::from_utf8(datagram).unwrap();

    let command = Command::parse(text).unwrap();
    assert_eq!(command.encode(), "c /docs d");
    assert_eq!(command.op_name(), "create");
    assert!(!command.is_print());
}
