//! Scene loading.
//!
//! Two sources are supported:
//!
//! - A directory of plain-text files, one number per line:
//!   - `spheres.txt`: 9 mask rows
//!   - `squares.txt` (or `planes.txt`): 9 mask rows
//!   - `triangles.txt`: `x`, `y`, `z` lines, `END_VERTEX` after each vertex,
//!     `END_TRIANGLE` after each triangle
//!   - `lights.txt`: `x`, `y`, `z`, `intensity` per light
//! - A JSON [`SceneDescription`].
//!
//! Missing text files mean "none of that primitive"; a missing `lights.txt`
//! falls back to the reference light.

use std::fs;
use std::path::{Path, PathBuf};

use card_math::Vec3;
use thiserror::Error;

use crate::scene::{BitMask, Light, Scene, SceneDescription, SceneLimits, Triangle, MASK_ROWS};

const END_VERTEX: &str = "END_VERTEX";
const END_TRIANGLE: &str = "END_TRIANGLE";

/// Errors that can occur during scene loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{file}: parse error at line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{file}: unexpected end of file")]
    UnexpectedEof { file: String },

    #[error("{file}: expected {expected} at line {line}, found {found:?}")]
    InvalidSentinel {
        file: String,
        line: usize,
        found: String,
        expected: &'static str,
    },
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Load a scene from a directory of text files or a `.json` file.
pub fn load_scene<P: AsRef<Path>>(path: P, limits: &SceneLimits) -> LoadResult<Scene> {
    let path = path.as_ref();
    if path.is_dir() {
        load_scene_dir(path, limits)
    } else {
        load_scene_json(path, limits)
    }
}

/// Load the text-file scene format from `dir`.
pub fn load_scene_dir<P: AsRef<Path>>(dir: P, limits: &SceneLimits) -> LoadResult<Scene> {
    let dir = dir.as_ref();
    log::info!("Loading scene from {}", dir.display());

    let spheres = match read_optional(dir.join("spheres.txt"))? {
        Some((name, text)) => parse_mask(&text, &name)?,
        None => BitMask::EMPTY,
    };

    let squares_file = read_optional(dir.join("squares.txt"))?
        .map_or_else(|| read_optional(dir.join("planes.txt")), |found| Ok(Some(found)))?;
    let squares = match squares_file {
        Some((name, text)) => parse_mask(&text, &name)?,
        None => BitMask::EMPTY,
    };

    let triangles = match read_optional(dir.join("triangles.txt"))? {
        Some((name, text)) => parse_triangles(&text, &name)?,
        None => Vec::new(),
    };

    let lights = match read_optional(dir.join("lights.txt"))? {
        Some((name, text)) => parse_lights(&text, &name)?,
        None => {
            log::debug!("No lights.txt, using the reference light");
            vec![Light::reference()]
        }
    };

    let desc = SceneDescription {
        spheres,
        squares,
        triangles,
        lights,
    };
    Ok(Scene::new(desc, limits))
}

/// Load a JSON [`SceneDescription`].
pub fn load_scene_json<P: AsRef<Path>>(path: P, limits: &SceneLimits) -> LoadResult<Scene> {
    let path = path.as_ref();
    log::info!("Loading scene from {}", path.display());
    let text = fs::read_to_string(path)?;
    let desc: SceneDescription = serde_json::from_str(&text)?;
    Ok(Scene::new(desc, limits))
}

fn read_optional(path: PathBuf) -> LoadResult<Option<(String, String)>> {
    if !path.exists() {
        return Ok(None);
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("scene file")
        .to_string();
    let text = fs::read_to_string(&path)?;
    Ok(Some((name, text)))
}

/// Non-empty trimmed lines with their 1-based line numbers.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

fn parse_error(file: &str, line: usize, message: impl Into<String>) -> LoadError {
    LoadError::Parse {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

/// Parse up to [`MASK_ROWS`] integers. Missing rows stay empty; extra lines
/// are ignored.
pub fn parse_mask(text: &str, file: &str) -> LoadResult<BitMask> {
    let mut mask = BitMask::EMPTY;
    for (row, (line_no, line)) in content_lines(text).take(MASK_ROWS).enumerate() {
        let value: i64 = line
            .parse()
            .map_err(|_| parse_error(file, line_no, format!("invalid mask row {line:?}")))?;
        mask.0[row] = value as u32;
    }
    Ok(mask)
}

fn parse_f32(file: &str, line_no: usize, line: &str) -> LoadResult<f32> {
    line.parse()
        .map_err(|_| parse_error(file, line_no, format!("invalid number {line:?}")))
}

/// Parse the sentinel-delimited triangle list.
pub fn parse_triangles(text: &str, file: &str) -> LoadResult<Vec<Triangle>> {
    let mut triangles = Vec::new();
    let mut coords: Vec<f32> = Vec::with_capacity(3);
    let mut vertices: Vec<Vec3> = Vec::with_capacity(3);

    for (line_no, line) in content_lines(text) {
        match line {
            END_VERTEX => {
                if coords.len() != 3 || vertices.len() == 3 {
                    return Err(parse_error(
                        file,
                        line_no,
                        format!("{END_VERTEX} after {} coordinates", coords.len()),
                    ));
                }
                vertices.push(Vec3::new(coords[0], coords[1], coords[2]));
                coords.clear();
            }
            END_TRIANGLE => {
                if vertices.len() != 3 || !coords.is_empty() {
                    return Err(parse_error(
                        file,
                        line_no,
                        format!("{END_TRIANGLE} after {} vertices", vertices.len()),
                    ));
                }
                triangles.push(Triangle::new(vertices[0], vertices[1], vertices[2]));
                vertices.clear();
            }
            _ => {
                if coords.len() == 3 {
                    return Err(LoadError::InvalidSentinel {
                        file: file.to_string(),
                        line: line_no,
                        found: line.to_string(),
                        expected: END_VERTEX,
                    });
                }
                if vertices.len() == 3 {
                    return Err(LoadError::InvalidSentinel {
                        file: file.to_string(),
                        line: line_no,
                        found: line.to_string(),
                        expected: END_TRIANGLE,
                    });
                }
                coords.push(parse_f32(file, line_no, line)?);
            }
        }
    }

    if !coords.is_empty() || !vertices.is_empty() {
        return Err(LoadError::UnexpectedEof {
            file: file.to_string(),
        });
    }
    log::debug!("{}: {} triangles", file, triangles.len());
    Ok(triangles)
}

/// Parse `x y z intensity` groups, one value per line.
pub fn parse_lights(text: &str, file: &str) -> LoadResult<Vec<Light>> {
    let values = content_lines(text)
        .map(|(line_no, line)| parse_f32(file, line_no, line))
        .collect::<LoadResult<Vec<f32>>>()?;

    if values.len() % 4 != 0 {
        return Err(LoadError::UnexpectedEof {
            file: file.to_string(),
        });
    }

    let lights: Vec<Light> = values
        .chunks_exact(4)
        .map(|c| Light::new(Vec3::new(c[0], c[1], c[2]), c[3]))
        .collect();
    for (i, light) in lights.iter().enumerate() {
        log::info!(
            "Light {}: {:?} intensity {}",
            i,
            light.position,
            light.intensity
        );
    }
    Ok(lights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{REFERENCE_SPHERES, SceneLimits};
    use std::io::Write;

    const TRIANGLE_TEXT: &str = "\
0.0
0.0
1.0
END_VERTEX
1.0
0.0
1.0
END_VERTEX
0.0
1.0
1.0
END_VERTEX
END_TRIANGLE
";

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_parse_mask() {
        let text: String = REFERENCE_SPHERES.iter().map(|v| format!("{v}\n")).collect();
        let mask = parse_mask(&text, "spheres.txt").unwrap();
        assert_eq!(mask.0, REFERENCE_SPHERES);
    }

    #[test]
    fn test_parse_mask_short_file() {
        let mask = parse_mask("16\n\n16\n", "spheres.txt").unwrap();
        assert_eq!(mask.0[0], 16);
        assert_eq!(mask.0[1], 16);
        assert_eq!(mask.0[2], 0);
    }

    #[test]
    fn test_parse_mask_rejects_garbage() {
        let err = parse_mask("16\nsixteen\n", "spheres.txt").unwrap_err();
        match err {
            LoadError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_parse_triangles() {
        let text = format!("{TRIANGLE_TEXT}{TRIANGLE_TEXT}");
        let tris = parse_triangles(&text, "triangles.txt").unwrap();
        assert_eq!(tris.len(), 2);
        assert_eq!(tris[0].v1, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(tris[1].v2, Vec3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn test_parse_triangles_missing_sentinel() {
        let text = "0\n0\n1\n2\n";
        let err = parse_triangles(text, "triangles.txt").unwrap_err();
        assert!(matches!(
            err,
            LoadError::InvalidSentinel { line: 4, expected: END_VERTEX, .. }
        ));
    }

    #[test]
    fn test_parse_triangles_truncated() {
        let text = "0\n0\n1\nEND_VERTEX\n";
        let err = parse_triangles(text, "triangles.txt").unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_parse_lights() {
        let lights = parse_lights("9\n9\n16\n1\n-3\n2\n10\n0.5\n", "lights.txt").unwrap();
        assert_eq!(lights, vec![
            Light::reference(),
            Light::new(Vec3::new(-3.0, 2.0, 10.0), 0.5),
        ]);
        assert!(parse_lights("1\n2\n3\n", "lights.txt").is_err());
    }

    #[test]
    fn test_load_scene_dir() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "spheres.txt", "1\n0\n0\n0\n0\n0\n0\n0\n0\n");
        write_file(dir.path(), "planes.txt", "0\n2\n");
        write_file(dir.path(), "triangles.txt", TRIANGLE_TEXT);
        write_file(dir.path(), "lights.txt", "1\n2\n3\n4\n");

        let scene = load_scene(dir.path(), &SceneLimits::default()).unwrap();
        assert_eq!(scene.sphere_count(), 1);
        assert_eq!(scene.square_count(), 1);
        assert!(scene.square_mask().is_set(1, 1));
        assert_eq!(scene.triangle_count(), 1);
        assert_eq!(scene.lights(), &[Light::new(Vec3::new(1.0, 2.0, 3.0), 4.0)]);
    }

    #[test]
    fn test_load_scene_dir_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let scene = load_scene_dir(dir.path(), &SceneLimits::default()).unwrap();
        assert_eq!(scene.sphere_count(), 0);
        assert_eq!(scene.triangle_count(), 0);
        assert_eq!(scene.lights(), &[Light::reference()]);
    }

    #[test]
    fn test_load_scene_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        let desc = SceneDescription::reference();
        fs::write(&path, serde_json::to_string_pretty(&desc).unwrap()).unwrap();

        let scene = load_scene(&path, &SceneLimits::default()).unwrap();
        assert_eq!(scene.to_description(), desc);
    }

    #[test]
    fn test_load_scene_json_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        fs::write(&path, "{ \"spheres\": 12 }").unwrap();
        assert!(matches!(
            load_scene_json(&path, &SceneLimits::default()),
            Err(LoadError::Json(_))
        ));
    }

    #[test]
    fn test_load_scene_missing_file() {
        let err = load_scene("/definitely/not/here.json", &SceneLimits::default()).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}
