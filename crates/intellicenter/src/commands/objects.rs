//! Object browsing handlers.

use std::sync::Arc;

use tabled::Tabled;

use intellicenter_core::{Controller, ObjectType, PoolObject};

use crate::cli::{GlobalOpts, ObjectsArgs, ObjectsCommand};
use crate::error::CliError;
use crate::output;

// ── Table row ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "Object")]
    objnam: String,
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Subtype")]
    subtype: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Parent")]
    parent: String,
}

fn to_row(obj: &Arc<PoolObject>) -> ObjectRow {
    ObjectRow {
        objnam: obj.objnam().to_owned(),
        object_type: obj.object_type().to_string(),
        subtype: obj.subtype().unwrap_or("-").to_owned(),
        name: obj.sname().unwrap_or("").to_owned(),
        status: obj.status().unwrap_or("-").to_owned(),
        parent: obj.parent().unwrap_or("-").to_owned(),
    }
}

fn detail(obj: &Arc<PoolObject>) -> String {
    let mut lines = vec![
        ("OBJNAM", obj.objnam().to_owned()),
        ("OBJTYP", obj.object_type().to_string()),
    ];
    lines.extend(
        obj.attributes()
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone())),
    );
    output::detail_lines(lines)
}

// ── Handler ──────────────────────────────────────────────────────────

pub fn handle(controller: &Controller, args: ObjectsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let model = controller.model();

    let out = match args.command {
        ObjectsCommand::List { r#type, subtype } => {
            let wanted_type = r#type.map(|t| ObjectType::parse(&t.to_ascii_uppercase()));
            let wanted_subtype = subtype.map(|s| s.to_ascii_uppercase());
            let objects: Vec<Arc<PoolObject>> = model
                .iter()
                .filter(|obj| wanted_type.as_ref().is_none_or(|t| obj.object_type() == t))
                .filter(|obj| {
                    wanted_subtype
                        .as_deref()
                        .is_none_or(|s| obj.subtype() == Some(s))
                })
                .cloned()
                .collect();
            output::render_list(&global.output, &objects, to_row, |o| o.objnam().to_owned())
        }
        ObjectsCommand::Get { objnam } => {
            let obj = model
                .get(&objnam)
                .ok_or_else(|| CliError::NotFound { objnam: objnam.clone() })?;
            output::render_single(&global.output, obj, detail, |o| o.objnam().to_owned())
        }
        ObjectsCommand::Children { objnam } => {
            if !model.contains(&objnam) {
                return Err(CliError::NotFound { objnam });
            }
            let children: Vec<Arc<PoolObject>> = model.children(&objnam).cloned().collect();
            output::render_list(&global.output, &children, to_row, |o| o.objnam().to_owned())
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}
