use std::path::Path;

use content_core::fs::{
    Token, extension_of, natural_cmp, natural_cmp_path, normalize_extension, tokenize,
    validate_name, validate_path,
};

#[test]
fn natural_cmp_orders_numeric_sections() {
    let mut names = vec!["pak10.cpak", "pak2.cpak", "pak1.cpak", "pak11.cpak"];
    names.sort_by(|a, b| natural_cmp(a, b));
    assert_eq!(names, vec!["pak1.cpak", "pak2.cpak", "pak10.cpak", "pak11.cpak"]);
}

#[test]
fn natural_cmp_path_ignores_case() {
    let a = Path::new("Content/001.CPAK");
    let b = Path::new("content/2.cpak");
    assert!(natural_cmp_path(a, b).is_lt());
}

#[test]
fn tokenize_splits_numbers_and_text() {
    let tokens = tokenize("Level12-Part003");
    assert_eq!(tokens.len(), 4);
    assert!(matches!(tokens[0], Token::Text(text) if text.eq_ignore_ascii_case("level")));
    assert!(matches!(tokens[1], Token::Number("12", 12)));
    assert!(matches!(tokens[2], Token::Text(text) if text.eq_ignore_ascii_case("-part")));
    assert!(matches!(tokens[3], Token::Number("003", 3)));
}

#[test]
fn extensions_come_from_the_last_segment() {
    assert_eq!(extension_of("maps/level.one/tiles.TGA"), Some("TGA"));
    assert_eq!(extension_of("maps/level.one/tiles"), None);
    assert_eq!(extension_of(".hidden"), None);
    assert_eq!(extension_of("trailing."), None);
    assert_eq!(normalize_extension(".PNG").unwrap(), "png");
    assert!(normalize_extension(".").is_err());
}

#[test]
fn logical_paths_allow_separators_but_names_do_not() {
    assert!(validate_path("maps/level1.map").is_ok());
    assert!(validate_path("  ").is_err());
    assert!(validate_path("what?.txt").is_err());
    assert!(validate_name("level1.map").is_ok());
    assert!(validate_name("maps/level1.map").is_err());
    assert!(validate_name("c:level1.map").is_err());
    assert!(validate_name("..").is_err());
}
