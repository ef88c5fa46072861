//! Loading scene documents, images and panoramas from disk (or over HTTP on wasm).
//!
//! File names are resolved against `./assets` natively and against the page origin on the
//! web. URIs inside a glTF file are resolved relative to that file.

use anyhow::{Context as _, bail};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::data_structures::scene::{
    Accessor, AccessorType, BufferData, BufferTarget, BufferView, ComponentType, Document,
    LocalTransform, Material, Mesh, Node, Primitive, PrimitiveMode, SamplerDef, Scene, TextureRef,
};

pub mod texture;

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("no window")?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("page has no origin"))?;
    let base = reqwest::Url::parse(&format!("{origin}/assets/"))?;
    Ok(base.join(file_name)?)
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = {
        let path = std::path::Path::new("./assets").join(file_name);
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
    };

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = std::path::Path::new("./assets").join(file_name);
        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?
    };

    Ok(data)
}

/// Directory part of a slash separated path, used as the base for relative URIs.
fn dirname(file_name: &str) -> &str {
    file_name.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn resolve(base: &str, uri: &str) -> String {
    if base.is_empty() {
        uri.to_string()
    } else {
        format!("{base}/{uri}")
    }
}

/// Decodes a `data:[<media type>];base64,<payload>` URI.
fn decode_data_uri(uri: &str) -> anyhow::Result<Vec<u8>> {
    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .context("malformed data URI")?;
    if !header.ends_with(";base64") {
        bail!("data URI is not base64 encoded");
    }
    Ok(BASE64.decode(payload)?)
}

/// Loads a `.gltf` or `.glb` file with its buffers and images into a [`Document`].
/// The document is validated before it is returned.
pub async fn load_gltf(file_name: &str) -> anyhow::Result<Document> {
    let bytes = load_binary(file_name).await?;
    parse_gltf(&bytes, file_name).await
}

/// Builds a [`Document`] from glTF bytes. External URIs resolve next to `file_name`;
/// embedded `data:` URIs are decoded in place.
pub async fn parse_gltf(bytes: &[u8], file_name: &str) -> anyhow::Result<Document> {
    let gltf = gltf::Gltf::from_slice(bytes).with_context(|| format!("parsing {file_name}"))?;
    let base = dirname(file_name);

    let mut buffers = Vec::new();
    for buffer in gltf.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => {
                let mut blob = gltf.blob.clone().context("GLB binary chunk missing")?;
                // the chunk is padded to four bytes
                blob.truncate(buffer.length());
                blob
            }
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => decode_data_uri(uri)
                .with_context(|| format!("buffer {}", buffer.index()))?,
            gltf::buffer::Source::Uri(uri) => load_binary(&resolve(base, uri)).await?,
        };
        buffers.push(BufferData {
            byte_length: buffer.length(),
            data,
        });
    }

    let buffer_views: Vec<BufferView> = gltf
        .views()
        .map(|view| BufferView {
            buffer: view.buffer().index(),
            byte_offset: view.offset(),
            byte_length: view.length(),
            byte_stride: view.stride(),
            target: view.target().map(|t| match t {
                gltf::buffer::Target::ArrayBuffer => BufferTarget::Vertex,
                gltf::buffer::Target::ElementArrayBuffer => BufferTarget::Index,
            }),
        })
        .collect();

    let accessors = gltf.accessors().map(convert_accessor).collect();

    let mut images = Vec::new();
    for image in gltf.images() {
        let encoded = match image.source() {
            gltf::image::Source::View { view, .. } => {
                let buffer = buffers
                    .get(view.buffer().index())
                    .context("image view references a missing buffer")?;
                view.offset()
                    .checked_add(view.length())
                    .and_then(|end| buffer.data.get(view.offset()..end))
                    .with_context(|| format!("image {} view out of bounds", image.index()))?
                    .to_vec()
            }
            gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
                decode_data_uri(uri).with_context(|| format!("image {}", image.index()))?
            }
            gltf::image::Source::Uri { uri, .. } => load_binary(&resolve(base, uri)).await?,
        };
        let decoded = image::load_from_memory(&encoded)
            .with_context(|| format!("decoding image {}", image.index()))?
            .to_rgba8();
        images.push(decoded);
    }

    let samplers = gltf
        .samplers()
        .map(|s| SamplerDef {
            mag_filter: s.mag_filter().map(|f| f.as_gl_enum()),
            min_filter: s.min_filter().map(|f| f.as_gl_enum()),
            wrap_s: s.wrap_s().as_gl_enum(),
            wrap_t: s.wrap_t().as_gl_enum(),
        })
        .collect();

    let textures = gltf
        .textures()
        .map(|t| TextureRef {
            source: t.source().index(),
            sampler: t.sampler().index(),
        })
        .collect();

    let materials = gltf
        .materials()
        .map(|m| {
            let pbr = m.pbr_metallic_roughness();
            Material {
                name: m.name().map(str::to_string),
                base_color_texture: pbr.base_color_texture().map(|t| t.texture().index()),
                metallic_roughness_texture: pbr
                    .metallic_roughness_texture()
                    .map(|t| t.texture().index()),
                metallic_factor: pbr.metallic_factor(),
                roughness_factor: pbr.roughness_factor(),
            }
        })
        .collect();

    let meshes = gltf
        .meshes()
        .map(|mesh| Mesh {
            name: mesh.name().map(str::to_string),
            primitives: mesh
                .primitives()
                .map(|p| Primitive {
                    indices: p.indices().map(|a| a.index()),
                    position: p.get(&gltf::Semantic::Positions).map(|a| a.index()),
                    normal: p.get(&gltf::Semantic::Normals).map(|a| a.index()),
                    tex_coord: p.get(&gltf::Semantic::TexCoords(0)).map(|a| a.index()),
                    material: p.material().index(),
                    mode: PrimitiveMode::from_gl(p.mode().as_gl_enum())
                        .unwrap_or(PrimitiveMode::Triangles),
                })
                .collect(),
        })
        .collect();

    let nodes = gltf
        .nodes()
        .map(|node| Node {
            name: node.name().map(str::to_string),
            transform: match node.transform() {
                gltf::scene::Transform::Matrix { matrix } => {
                    LocalTransform::Matrix(bytemuck::cast(matrix))
                }
                gltf::scene::Transform::Decomposed {
                    translation,
                    rotation,
                    scale,
                } => LocalTransform::Trs {
                    translation,
                    rotation,
                    scale,
                },
            },
            mesh: node.mesh().map(|m| m.index()),
            children: node.children().map(|c| c.index()).collect(),
        })
        .collect();

    let scenes = gltf
        .scenes()
        .map(|s| Scene {
            name: s.name().map(str::to_string),
            nodes: s.nodes().map(|n| n.index()).collect(),
        })
        .collect();

    let document = Document {
        nodes,
        meshes,
        materials,
        textures,
        images,
        samplers,
        accessors,
        buffer_views,
        buffers,
        scenes,
        scene: gltf.default_scene().map(|s| s.index()),
    };
    document
        .validate()
        .with_context(|| format!("invalid scene {file_name}"))?;
    log::info!(
        "loaded {file_name}: {} nodes, {} meshes, {} textures",
        document.nodes.len(),
        document.meshes.len(),
        document.textures.len()
    );
    Ok(document)
}

fn convert_accessor(accessor: gltf::Accessor) -> Accessor {
    use gltf::accessor::{DataType, Dimensions};
    Accessor {
        buffer_view: accessor.view().map(|v| v.index()),
        byte_offset: accessor.offset(),
        count: accessor.count(),
        component_type: match accessor.data_type() {
            DataType::I8 => ComponentType::Byte,
            DataType::U8 => ComponentType::UnsignedByte,
            DataType::I16 => ComponentType::Short,
            DataType::U16 => ComponentType::UnsignedShort,
            DataType::U32 => ComponentType::UnsignedInt,
            DataType::F32 => ComponentType::Float,
        },
        accessor_type: match accessor.dimensions() {
            Dimensions::Scalar => AccessorType::Scalar,
            Dimensions::Vec2 => AccessorType::Vec2,
            Dimensions::Vec3 => AccessorType::Vec3,
            Dimensions::Vec4 => AccessorType::Vec4,
            Dimensions::Mat2 => AccessorType::Mat2,
            Dimensions::Mat3 => AccessorType::Mat3,
            Dimensions::Mat4 => AccessorType::Mat4,
        },
        normalized: accessor.normalized(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_resolve_next_to_the_scene() {
        assert_eq!(dirname("models/duck/duck.gltf"), "models/duck");
        assert_eq!(dirname("duck.gltf"), "");
        assert_eq!(resolve("models/duck", "duck0.bin"), "models/duck/duck0.bin");
        assert_eq!(resolve("", "duck0.bin"), "duck0.bin");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = futures::executor::block_on(load_gltf("does/not/exist.gltf"));
        assert!(result.is_err());
    }

    #[test]
    fn data_uris_decode() {
        assert_eq!(
            decode_data_uri("data:application/octet-stream;base64,AQID").unwrap(),
            vec![1, 2, 3]
        );
        assert!(decode_data_uri("data:text/plain,hello").is_err());
        assert!(decode_data_uri("data:;base64").is_err());
    }

    #[test]
    fn embedded_gltf_loads() {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = [[0.0f32, 0.0, 1.0]; 3];
        let uvs: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let indices: [u16; 3] = [0, 1, 2];
        let mut bin: Vec<u8> = Vec::new();
        bin.extend_from_slice(bytemuck::cast_slice(&positions));
        bin.extend_from_slice(bytemuck::cast_slice(&normals));
        bin.extend_from_slice(bytemuck::cast_slice(&uvs));
        bin.extend_from_slice(bytemuck::cast_slice(&indices));
        assert_eq!(bin.len(), 102);

        let json = r#"{
  "asset": { "version": "2.0" },
  "scene": 0,
  "scenes": [{ "nodes": [0] }],
  "nodes": [{ "mesh": 0 }],
  "meshes": [{ "primitives": [{
    "attributes": { "POSITION": 0, "NORMAL": 1, "TEXCOORD_0": 2 },
    "indices": 3
  }] }],
  "buffers": [{ "byteLength": 102, "uri": "URI" }],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
    { "buffer": 0, "byteOffset": 36, "byteLength": 36, "target": 34962 },
    { "buffer": 0, "byteOffset": 72, "byteLength": 24, "target": 34962 },
    { "buffer": 0, "byteOffset": 96, "byteLength": 6, "target": 34963 }
  ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
    { "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3" },
    { "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC2" },
    { "bufferView": 3, "componentType": 5123, "count": 3, "type": "SCALAR" }
  ]
}"#
        .replace(
            "URI",
            &format!("data:application/octet-stream;base64,{}", BASE64.encode(&bin)),
        );

        let doc = futures::executor::block_on(parse_gltf(json.as_bytes(), "embedded.gltf"))
            .unwrap();
        assert_eq!(doc.buffers[0].data, bin);
        assert_eq!(doc.view_bytes(3).unwrap(), bytemuck::cast_slice::<u16, u8>(&indices));
        assert_eq!(doc.meshes[0].primitives[0].indices, Some(3));
        assert_eq!(doc.scene, Some(0));
    }
}
