use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

#[pyclass]
#[derive(Clone)]
struct CommandPy {
    #[pyo3(get)]
    name: String,
    #[pyo3(get)]
    payload: String,
    #[pyo3(get)]
    line: usize,
    #[pyo3(get)]
    params: Vec<(String, String)>,
}

impl From<crate::Command> for CommandPy {
    fn from(c: crate::Command) -> Self {
        Self {
            name: c.name,
            payload: c.payload,
            line: c.line_no,
            params: c.params.into_iter().map(|p| (p.name, p.payload)).collect(),
        }
    }
}

#[pyfunction]
#[pyo3(signature = (text, strict = false))]
fn parse(text: &str, strict: bool) -> PyResult<Vec<CommandPy>> {
    let parsed = if strict { crate::parse_str_strict(text) } else { crate::parse_str(text) };
    let cmds = parsed.map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(cmds.into_iter().map(CommandPy::from).collect())
}

#[pyfunction]
fn render(text: &str) -> PyResult<String> {
    let cmds = crate::parse_str(text).map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(crate::render_document(&cmds))
}

#[pyfunction]
fn search_replace(pattern: &str, content: &str, new: &str) -> PyResult<String> {
    let block = crate::SearchBlock::parse(pattern);
    if !block.is_match(content) {
        return Err(PyValueError::new_err("search string not found"));
    }
    Ok(block.replace(content, new))
}

#[pymodule]
fn cmdblock(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<CommandPy>()?;
    m.add_function(wrap_pyfunction!(parse, m)?)?;
    m.add_function(wrap_pyfunction!(render, m)?)?;
    m.add_function(wrap_pyfunction!(search_replace, m)?)?;
    Ok(())
}
