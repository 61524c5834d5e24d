use super::*;

#[test]
fn as_str_matches_debug_name() {
    for code in ErrorCode::ALL {
        assert_eq!(code.as_str(), format!("{code:?}"));
    }
}

#[test]
fn categories_follow_the_leading_digit() {
    for code in ErrorCode::ALL {
        let category = [
            code.is_structural_rejection(),
            code.is_internal_inconsistency(),
            code.is_warning(),
        ];
        let expected = match &code.as_str()[..2] {
            "E1" => [true, false, false],
            "E2" => [false, true, false],
            "W1" => [false, false, true],
            _ => [false; 3],
        };
        assert_eq!(category, expected, "{code}");
    }
    assert_eq!(ErrorCode::E3001.to_string(), "E3001");
}
