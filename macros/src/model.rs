use darling::{ast, FromDeriveInput, FromField};
use quote::{format_ident, quote};

const GENERATED: &str = "generated";

#[derive(Debug, FromDeriveInput)]
#[darling(supports(struct_named), forward_attrs)]
struct ModelInputReceiver {
	ident: syn::Ident,

	generics: syn::Generics,

	data: ast::Data<(), ModelFieldReceiver>,

	attrs: Vec<syn::Attribute>,
}

#[derive(Debug, FromField)]
#[darling(forward_attrs)]
struct ModelFieldReceiver {
	ident: Option<syn::Ident>,

	ty: syn::Type,
	vis: syn::Visibility,

	attrs: Vec<syn::Attribute>,
}

impl ModelFieldReceiver {
	fn is_generated(&self) -> bool {
		self.attrs.iter().any(is_generated)
	}
}

fn is_generated(attr: &syn::Attribute) -> bool {
	matches!(attr.meta, syn::Meta::Path(ref path) if path.is_ident(GENERATED))
}

pub fn from_input(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
	let mut input = syn::parse_macro_input!(input as syn::DeriveInput);
	let receiver = match ModelInputReceiver::from_derive_input(&input) {
		Ok(x) => x,
		Err(e) => return e.write_errors().into(),
	};

	// `#[generated]` is only a marker for this macro, so it must not reach the compiler
	if let syn::Data::Struct(ref mut data) = input.data {
		for field in &mut data.fields {
			field.attrs.retain(|attr| !is_generated(attr));
		}
	}

	let ident = &receiver.ident;
	let vis = &input.vis;
	let generics = &receiver.generics;
	let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
	let new_ident = format_ident!("New{}", ident);

	let attrs = &receiver.attrs;

	let Some(fields) = receiver.data.take_struct() else {
		return syn::Error::new_spanned(&input.ident, "#[model] only supports structs")
			.into_compile_error()
			.into();
	};

	let (generated, provided): (Vec<_>, Vec<_>) = fields
		.iter()
		.filter(|field| field.ident.is_some())
		.partition(|field| field.is_generated());

	if generated.is_empty() {
		return syn::Error::new_spanned(
			&input.ident,
			"#[model] requires at least one #[generated] field",
		)
		.into_compile_error()
		.into();
	}

	let new_fields = provided.iter().map(|field| {
		let ident = &field.ident;
		let ty = &field.ty;
		let vis = &field.vis;
		let attrs = &field.attrs;

		quote! {
			#(#attrs)*
			#vis #ident: #ty,
		}
	});

	let arguments = generated.iter().map(|field| {
		let ident = &field.ident;
		let ty = &field.ty;

		quote!(#ident: #ty)
	});

	let generated_idents = generated.iter().map(|field| &field.ident);
	let provided_idents = provided.iter().map(|field| &field.ident);
	let doc = format!("Assembles a [`{ident}`] from this candidate and its generated fields.");

	quote! {
		#input

		#(#attrs)*
		#vis struct #new_ident #generics {
			#(
				#new_fields
			)*
		}

		impl #impl_generics #new_ident #ty_generics #where_clause {
			#[doc = #doc]
			#vis fn into_model(self, #(#arguments),*) -> #ident #ty_generics {
				#ident {
					#(#generated_idents,)*
					#(#provided_idents: self.#provided_idents,)*
				}
			}
		}
	}
	.into()
}
