/// One line of the compatibility summary.
pub(super) struct Row {
    pub position: String,
    pub layer: String,
    pub layer_ok: bool,
    pub act_fn: Option<String>,
    pub act_fn_ok: bool,
}

const HEADERS: [&str; 5] = ["Position", "Layer", "Supported", "Activation", "Supported"];

/// Renders the rows as a plain text table.
pub(super) fn render(rows: &[Row]) -> String {
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|row| {
            let (act_fn, act_fn_ok) = match &row.act_fn {
                Some(name) => (name.clone(), mark(row.act_fn_ok)),
                None => ("-".to_string(), "-".to_string()),
            };
            [
                row.position.clone(),
                row.layer.clone(),
                mark(row.layer_ok),
                act_fn,
                act_fn_ok,
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for line in &cells {
        for (w, cell) in widths.iter_mut().zip(line) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let fmt_line = |line: &[String]| {
        line.iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let headers = HEADERS.map(String::from);
    let mut out = vec![fmt_line(&headers)];
    out.push(widths.map(|w| "-".repeat(w)).join("-+-"));
    out.extend(cells.iter().map(|line| fmt_line(line)));
    out.join("\n")
}

fn mark(ok: bool) -> String {
    let mark = if ok { "yes" } else { "NO" };
    mark.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_aligned() {
        let rows = [
            Row {
                position: "1".into(),
                layer: "Dense(2 => 3, tanh)".into(),
                layer_ok: true,
                act_fn: Some("tanh".into()),
                act_fn_ok: false,
            },
            Row {
                position: "2".into(),
                layer: "Flatten".into(),
                layer_ok: true,
                act_fn: None,
                act_fn_ok: true,
            },
        ];

        let table = render(&rows);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("NO"));
        assert_eq!(lines[2].find('|'), lines[3].find('|'));
    }
}
