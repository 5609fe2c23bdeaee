use super::*;
use sheet::Row;

fn row(cells: &[&str]) -> Row {
    Row::new(cells.iter().map(|c| c.to_string()).collect())
}

fn items_schema() -> SheetSchema {
    let columns = infer_columns(
        &row(&["id", "name", "count"]),
        &row(&["int", "string", "int_list"]),
    );
    let mut next = 0;
    SheetSchema::build(message_name("Items", "Items"), columns, |_| -> Result<u32, ()> {
        next += 1;
        Ok(next)
    })
    .unwrap()
}

#[test]
fn annotations_map_to_scalars() {
    assert_eq!(ScalarType::from_annotation("bool"), (ScalarType::Bool, false));
    assert_eq!(ScalarType::from_annotation("INT"), (ScalarType::Int32, false));
    assert_eq!(ScalarType::from_annotation("float"), (ScalarType::Float32, false));
    assert_eq!(ScalarType::from_annotation("string"), (ScalarType::String, false));
    assert_eq!(ScalarType::from_annotation("text"), (ScalarType::String, false));
    assert_eq!(ScalarType::from_annotation("int_list"), (ScalarType::Int32, true));
    assert_eq!(ScalarType::from_annotation("Float_List"), (ScalarType::Float32, true));
    assert_eq!(ScalarType::from_annotation("bool_list"), (ScalarType::Bool, true));
    assert_eq!(ScalarType::from_annotation("string_list"), (ScalarType::String, true));
    // three parts is not a list annotation
    assert_eq!(ScalarType::from_annotation("int_list_x"), (ScalarType::String, false));
}

#[test]
fn inference_skips_blank_titles_and_annotations() {
    let cols = infer_columns(
        &row(&["", "id", " name ", "note", "", "flag"]),
        &row(&["int", "int", "string", "", "int", "bool"]),
    );
    let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "flag"]);
}

#[test]
fn duplicate_titles_promote_to_repeated() {
    let cols = infer_columns(
        &row(&["id", "reward", "reward", "reward"]),
        &row(&["int", "int", "int", "float"]),
    );
    assert_eq!(cols.len(), 2);
    let reward = &cols[1];
    assert!(reward.repeated);
    // first declared type wins
    assert_eq!(reward.scalar, ScalarType::Int32);
    assert_eq!(reward.type_signature(), "int32_array");
}

#[test]
fn list_annotation_marks_repeated_without_duplicates() {
    let schema = items_schema();
    let count = schema.column("count").unwrap();
    assert!(count.repeated);
    assert_eq!(count.type_signature(), "int32_array");
    assert_eq!(schema.column("id").unwrap().type_signature(), "int32");
}

#[test]
fn build_assigns_ids_in_column_order() {
    let schema = items_schema();
    let ids: Vec<u32> = schema.columns.iter().map(|c| c.field_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn build_stops_at_first_assignment_error() {
    let columns = infer_columns(&row(&["a", "b"]), &row(&["int", "int"]));
    let result = SheetSchema::build("m", columns, |c| {
        if c.name == "b" {
            Err("no ids left")
        } else {
            Ok(1)
        }
    });
    assert_eq!(result.unwrap_err(), "no ids left");
}

#[test]
fn key_column_is_case_insensitive() {
    let schema = items_schema();
    assert_eq!(schema.key_column().unwrap().name, "id");
    assert!(!schema.is_constant());
    assert_eq!(schema.column("NAME").unwrap().name, "name");

    let cols = infer_columns(&row(&["Key", "value"]), &row(&["string", "int"]));
    let keyed = SheetSchema::new("m", cols);
    assert_eq!(keyed.key_column().unwrap().name, "Key");

    let cols = infer_columns(&row(&["max_level", "start_gold"]), &row(&["int", "int"]));
    assert!(SheetSchema::new("m", cols).is_constant());
}

#[test]
fn naming_rules() {
    assert_eq!(message_name("Items", "Weapons"), "confpbItemsWeapons");
    assert_eq!(document_file_name("confpbItemsWeapons"), "confpbItemsWeapons.proto");
    assert_eq!(table_base_name("Items.xlsx"), "Items");
    assert_eq!(table_base_name("conf/sub/Shop.xlsx"), "Shop");
}

#[test]
fn identifiers_follow_proto_rules() {
    for ok in ["id", "_x", "Item2", "max_level", "confpbItemsItems"] {
        assert!(is_identifier(ok), "{ok}");
    }
    for bad in ["", "2nd", "Item List", "hp-max", "名字", "a.b"] {
        assert!(!is_identifier(bad), "{bad}");
    }
}

#[test]
fn layout_min_rows_covers_default_row() {
    assert_eq!(SheetLayout::default().min_rows(), 5);
    assert_eq!(SheetLayout::with_start_row(3).min_rows(), 5);
    assert_eq!(SheetLayout::with_start_row(8).min_rows(), 8);
}

#[test]
fn render_message_matches_expected_text() {
    let text = render_message(&items_schema());
    assert_eq!(
        text,
        "message confpbItemsItems {\n  int32 id = 1;\n  string name = 2;\n  repeated int32 count = 3;\n}\n"
    );
}

#[test]
fn rendered_document_parses_back() {
    let a = items_schema();
    let b = SheetSchema::new(
        "confpbAaaMain",
        vec![ColumnSpec {
            name: "ratio".into(),
            scalar: ScalarType::Float32,
            repeated: false,
            field_id: 7,
        }],
    );

    let doc = render_document([&a, &b]);
    assert!(doc.starts_with(DOCUMENT_HEADER));
    // sorted by message name
    assert!(doc.find("confpbAaaMain").unwrap() < doc.find("confpbItemsItems").unwrap());

    let parsed = parse_document(&doc).unwrap();
    assert_eq!(parsed, vec![b, a]);
}

#[test]
fn parser_tolerates_loose_formatting() {
    let doc = r#"
syntax = "proto3";
package conf;
option go_package="gen/proto;conf";

// hand edited
message  confpbXY   {

    repeated   string   tags = 4;   // trailing

    bool on=2;
}
message confpbEmpty {}
"#;
    let parsed = parse_document(doc).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].columns[0].name, "tags");
    assert!(parsed[0].columns[0].repeated);
    assert_eq!(parsed[0].columns[1].field_id, 2);
    assert!(parsed[1].columns.is_empty());
}

#[test]
fn parser_reports_line_numbers() {
    let doc = "message M {\n  int32 a = 1;\n  double b = 2;\n}\n";
    assert_eq!(
        parse_document(doc).unwrap_err(),
        SchemaError::Parse {
            line: 3,
            detail: "unsupported field type \"double\"".into()
        }
    );

    let truncated = "message M {\n  int32 a = 1;\n";
    assert!(matches!(parse_document(truncated), Err(SchemaError::Parse { .. })));
}

#[test]
fn find_message_by_name() {
    let doc = render_document([&items_schema()]);
    assert_eq!(find_message(&doc, "confpbItemsItems").unwrap(), items_schema());
    assert_eq!(
        find_message(&doc, "confpbNope").unwrap_err(),
        SchemaError::MessageNotFound("confpbNope".into())
    );
}
