use anyhow::{Result, anyhow};
use spoiler_core::{ContentValue, Editor, Op, Point, Selection, Transaction, toolbar_state};

fn main() -> Result<()> {
    let mut editor = Editor::with_inline_tools();

    editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "hello world".to_string(),
        }]))
        .map_err(|e| anyhow!("failed to insert text: {e:?}"))?;

    editor.set_selection(Selection {
        anchor: Point::new(vec![0, 0], 6),
        focus: Point::new(vec![0, 0], 11),
    });

    editor
        .run_command("spoiler.toggle", None)
        .map_err(|e| anyhow!("toggle failed: {}", e.message()))?;

    for state in toolbar_state(&editor).map_err(|e| anyhow!("{}", e.message()))? {
        println!("[{}] active: {}", state.id, state.active);
    }

    let value = ContentValue::from_document_sanitized(editor.doc(), editor.registry());
    println!("{}", value.to_json_pretty()?);

    editor
        .run_command("spoiler.toggle", None)
        .map_err(|e| anyhow!("toggle failed: {}", e.message()))?;

    for state in toolbar_state(&editor).map_err(|e| anyhow!("{}", e.message()))? {
        println!("[{}] active: {}", state.id, state.active);
    }

    let value = ContentValue::from_document_sanitized(editor.doc(), editor.registry());
    println!("{}", value.to_json_pretty()?);

    Ok(())
}
